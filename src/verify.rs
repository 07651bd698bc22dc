//! OpenPGP signature verification via the external `gpgv`/`gpg` binaries.
//! Keyrings are normalized to an armored form on disk, then dearmored into
//! a binary keyring inside an ephemeral `GNUPGHOME`.

use crate::error::{Kind, WatchError};
use crate::search::git::ephemeral_dir;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct Keyring {
    armored_path: PathBuf,
    gnupg_home: PathBuf,
}

impl Keyring {
    /// `keyring_path` is the conventional armored keyring shipped alongside
    /// the watch file (`debian/upstream/signing-key.asc`, typically). If
    /// only a legacy binary keyring is present it is enarmored in place,
    /// with the original preserved as `<name>.backup`.
    pub fn load(keyring_path: &Path) -> Result<Keyring, WatchError> {
        let armored_path = if is_armored(keyring_path)? {
            keyring_path.to_path_buf()
        } else {
            enarmor(keyring_path)?
        };

        let gnupg_home = ephemeral_dir("watchscan-gnupg")?;
        dearmor_into(&armored_path, &gnupg_home)?;

        Ok(Keyring { armored_path, gnupg_home })
    }

    fn gpgv(&self) -> Result<PathBuf, WatchError> {
        find_binary("gpgv2")
            .or_else(|| find_binary("gpgv"))
            .ok_or_else(|| WatchError::new(Kind::ToolMissing, "gpgv not found on PATH"))
    }

    fn keyring_file(&self) -> PathBuf {
        self.gnupg_home.join("keyring.gpg")
    }

    /// Detached signature: `gpgv --keyring K SIG FILE`.
    pub fn verify_detached(&self, sig_file: &Path, data_file: &Path) -> Result<(), WatchError> {
        let gpgv = self.gpgv()?;
        let mut cmd = Command::new(gpgv);
        cmd.env("GNUPGHOME", &self.gnupg_home);
        cmd.args(["--keyring"]).arg(self.keyring_file()).arg(sig_file).arg(data_file);
        run_checked(&mut cmd)
    }

    /// Self-signed (clear-signed) file: `gpgv -o OUT FILE` verifies and
    /// extracts the payload in one step.
    pub fn verify_self(&self, signed_file: &Path, extracted_out: &Path) -> Result<(), WatchError> {
        let gpgv = self.gpgv()?;
        let mut cmd = Command::new(gpgv);
        cmd.env("GNUPGHOME", &self.gnupg_home);
        cmd.args(["--keyring"]).arg(self.keyring_file());
        cmd.arg("-o").arg(extracted_out);
        cmd.arg(signed_file);
        run_checked(&mut cmd)
    }

    /// Git-tag signature: the tag object is `message\n-----BEGIN PGP
    /// SIGNATURE-----\n...`; split and verify the two halves.
    pub fn verify_git_tag(&self, repo_dir: &Path, tag: &str) -> Result<(), WatchError> {
        let mut cat = Command::new("git");
        cat.current_dir(repo_dir).args(["cat-file", "-p", tag]);
        let tag_object = crate::search::git::run(&mut cat)?;

        const MARKER: &str = "-----BEGIN PGP SIGNATURE-----";
        let idx = tag_object
            .find(MARKER)
            .ok_or_else(|| WatchError::new(Kind::Verify, "git tag object has no PGP signature"))?;
        let (message, signature) = tag_object.split_at(idx);

        let dir = ephemeral_dir("watchscan-gittag")?;
        let message_path = dir.join("message");
        let signature_path = dir.join("signature.asc");
        std::fs::write(&message_path, message)
            .map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;
        std::fs::write(&signature_path, signature)
            .map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;

        self.verify_detached(&signature_path, &message_path)
    }
}

impl Drop for Keyring {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.gnupg_home);
    }
}

fn is_armored(path: &Path) -> Result<bool, WatchError> {
    let content = std::fs::read(path).map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;
    Ok(content.starts_with(b"-----BEGIN PGP"))
}

fn enarmor(path: &Path) -> Result<PathBuf, WatchError> {
    let backup = path.with_extension("backup");
    std::fs::copy(path, &backup).map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;
    log::warn!("[verify] keyring {:?} is binary, converting to armored form", path);

    let gpg = find_binary("gpg2")
        .or_else(|| find_binary("gpg"))
        .ok_or_else(|| WatchError::new(Kind::ToolMissing, "gpg not found on PATH"))?;
    let armored = path.with_extension("asc");
    let mut cmd = Command::new(gpg);
    cmd.arg("--enarmor").arg("-o").arg(&armored).arg(path);
    run_checked(&mut cmd)?;
    Ok(armored)
}

fn dearmor_into(armored_path: &Path, gnupg_home: &Path) -> Result<(), WatchError> {
    let gpg = find_binary("gpg2")
        .or_else(|| find_binary("gpg"))
        .ok_or_else(|| WatchError::new(Kind::ToolMissing, "gpg not found on PATH"))?;
    let keyring = gnupg_home.join("keyring.gpg");
    let mut cmd = Command::new(gpg);
    cmd.env("GNUPGHOME", gnupg_home);
    cmd.arg("--dearmor").arg("-o").arg(&keyring).arg(armored_path);
    run_checked(&mut cmd)
}

fn run_checked(cmd: &mut Command) -> Result<(), WatchError> {
    let status = cmd.status().map_err(|e| WatchError::new(Kind::ToolMissing, &e.to_string()))?;
    if !status.success() {
        return Err(WatchError::new(Kind::Verify, &format!("{:?} exited with {}", cmd, status)));
    }
    Ok(())
}

/// Manual `PATH` search: the crate reaches for `std::env`/`std::fs` here
/// rather than a process-discovery dependency.
fn find_binary(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            Some(candidate)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_binary_locates_true_on_path() {
        let found = find_binary("true").or_else(|| find_binary("sh"));
        assert!(found.is_some());
    }
}
