//! Wraps the `mk-origtargz` child-process contract used to turn a
//! downloaded artifact into a canonical `orig.tar.*` source tarball.

use crate::error::{Kind, WatchError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct RepackRequest<'a> {
    pub downloaded_file: &'a Path,
    pub package: &'a str,
    pub version: &'a str,
    pub repack: bool,
    pub repacksuffix: Option<&'a str>,
    pub compression: Option<&'a str>,
    pub component: Option<&'a str>,
    pub copyright_file: Option<&'a Path>,
    pub destdir: &'a Path,
    pub signature_file: Option<&'a Path>,
    pub symlink_mode: Option<&'a str>,
    pub force_repack: bool,
    pub unzipopt: Option<&'a str>,
}

/// Runs `mk-origtargz` and returns the path to the produced artifact,
/// extracted from its last non-empty line of output.
pub fn invoke(req: &RepackRequest) -> Result<PathBuf, WatchError> {
    let mut cmd = Command::new("mk-origtargz");
    cmd.arg("--package").arg(req.package);
    cmd.arg("--version").arg(req.version);
    cmd.arg("--directory").arg(req.destdir);

    if req.repack {
        cmd.arg("--repack");
    }
    if let Some(suffix) = req.repacksuffix {
        cmd.arg("--repack-suffix").arg(suffix);
    }
    if let Some(c) = req.compression {
        cmd.arg("--compression").arg(c);
    }
    if let Some(component) = req.component {
        cmd.arg("--component").arg(component);
    }
    if let Some(copyright) = req.copyright_file {
        cmd.arg("--copyright-file").arg(copyright);
    }
    if let Some(sig) = req.signature_file {
        cmd.arg("--signature-file").arg(sig);
    }
    match req.symlink_mode {
        Some("rename") => {
            cmd.arg("--rename");
        }
        Some("copy") => {
            cmd.arg("--copy");
        }
        _ => {}
    }
    if req.force_repack {
        cmd.arg("--force-repack");
    }
    if let Some(unzipopt) = req.unzipopt {
        cmd.arg("--unzipopt").arg(unzipopt);
    }
    cmd.arg(req.downloaded_file);

    let output = cmd.output().map_err(|e| WatchError::new(Kind::ToolMissing, &e.to_string()))?;
    if !output.status.success() {
        return Err(WatchError::new(
            Kind::External,
            &format!("mk-origtargz failed: {}", String::from_utf8_lossy(&output.stderr)),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    extract_output_path(&stdout)
}

fn extract_output_path(stdout: &str) -> Result<PathBuf, WatchError> {
    let re = Regex::new(r"(\S+\.orig(?:-\S+)?\.tar\.\S+)\s*$").unwrap();
    for line in stdout.lines().rev() {
        if let Some(cap) = re.captures(line.trim()) {
            return Ok(PathBuf::from(&cap[1]));
        }
    }
    Err(WatchError::new(Kind::External, "could not locate repacked tarball in mk-origtargz output"))
}

/// Derive the mangled version string embedded in a repacked tarball's
/// filename, e.g. `foo_1.2.3+dfsg.orig.tar.xz` -> `1.2.3+dfsg`.
pub fn mangled_version_from_path(path: &Path, package: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let re = Regex::new(&format!(r"^{}_(.+)\.orig(?:-\S+)?\.tar\.\S+$", regex::escape(package))).ok()?;
    re.captures(name).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_path_from_last_line() {
        let stdout = "Successfully repacked...\nfoo_1.2.3.orig.tar.xz\n";
        let path = extract_output_path(stdout).unwrap();
        assert_eq!(path, PathBuf::from("foo_1.2.3.orig.tar.xz"));
    }

    #[test]
    fn mangled_version_extraction() {
        let path = PathBuf::from("foo_1.2.3+dfsg.orig.tar.xz");
        assert_eq!(mangled_version_from_path(&path, "foo").unwrap(), "1.2.3+dfsg");
    }
}
