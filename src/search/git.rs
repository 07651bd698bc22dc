//! Git repository searcher: clones (or re-uses a clone owned by the
//! Downloader's repo-state machine) and inspects tags/commits.

use super::{SearchResult, Searcher};
use crate::error::{Kind, WatchError};
use crate::version::PackageVersion;
use regex::Regex;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitMode {
    Full,
    Shallow,
}

pub struct GitSearcher {
    pub repo_url: String,
    pub refspec: String,
    pub tag_pattern: Option<Regex>,
    pub mode: GitMode,
    pub pretty: Option<String>,
    pub date_format: Option<String>,
    pub versionless: bool,
    work_dir: Option<PathBuf>,
}

impl GitSearcher {
    pub fn new(repo_url: &str, refspec: &str) -> GitSearcher {
        GitSearcher {
            repo_url: repo_url.to_string(),
            refspec: refspec.to_string(),
            tag_pattern: None,
            mode: GitMode::Full,
            pretty: None,
            date_format: None,
            versionless: false,
            work_dir: None,
        }
    }

    fn ensure_clone(&mut self) -> Result<PathBuf, WatchError> {
        if let Some(dir) = &self.work_dir {
            return Ok(dir.clone());
        }
        let dir = ephemeral_dir("watchscan-git")?;
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if self.mode == GitMode::Shallow && is_head_like(&self.refspec) {
            cmd.args(["--depth", "1"]);
            if let Some(branch) = self.refspec.strip_prefix("heads/") {
                cmd.args(["-b", branch]);
            }
        } else {
            cmd.arg("--bare");
        }
        cmd.arg(&self.repo_url).arg(&dir);
        run(&mut cmd)?;
        self.work_dir = Some(dir.clone());
        Ok(dir)
    }

    fn describe_version(&self, dir: &PathBuf) -> Result<String, WatchError> {
        if let (Some(pretty), _) = (&self.pretty, &self.date_format) {
            let mut cmd = Command::new("git");
            cmd.current_dir(dir).env("TZ", "UTC");
            cmd.args(["log", "-1", &format!("--pretty=format:{}", pretty)]);
            if let Some(date_fmt) = &self.date_format {
                cmd.arg(format!("--date=format:{}", date_fmt));
            }
            let out = run(&mut cmd)?;
            return Ok(out.trim().to_string());
        }

        let mut cmd = Command::new("git");
        cmd.current_dir(dir).args(["describe", "--tags"]);
        let out = run(&mut cmd)?;
        Ok(out.trim().replace('-', "."))
    }

    fn list_tags(&self, dir: &PathBuf) -> Result<Vec<String>, WatchError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir).args(["tag", "-l"]);
        let out = run(&mut cmd)?;
        Ok(out.lines().map(|l| l.to_string()).collect())
    }
}

impl Searcher for GitSearcher {
    fn search(&mut self) -> Result<Option<SearchResult>, WatchError> {
        let dir = self.ensure_clone()?;

        if self.versionless {
            let version = self.describe_version(&dir)?;
            return Ok(Some(SearchResult {
                newfile: self.refspec.clone(),
                newversion: version,
                sigfile: None,
            }));
        }

        let pattern = self
            .tag_pattern
            .as_ref()
            .ok_or_else(|| WatchError::new(Kind::Config, "git searcher needs a tag pattern or versionless"))?;

        let tags = self.list_tags(&dir)?;
        let mut candidates: Vec<(String, String)> = Vec::new();
        for tag in &tags {
            if let Some(cap) = pattern.captures(tag) {
                let groups: Vec<Option<String>> =
                    (1..cap.len()).map(|i| cap.get(i).map(|m| m.as_str().to_string())).collect();
                let version = super::version_from_captures(&groups);
                candidates.push((version, tag.clone()));
            }
        }

        candidates.sort_by(|a, b| {
            let pa = PackageVersion::parse_lenient(&a.0);
            let pb = PackageVersion::parse_lenient(&b.0);
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(candidates.into_iter().next().map(|(version, tag)| SearchResult {
            newfile: tag,
            newversion: version,
            sigfile: None,
        }))
    }

    fn upstream_url(&self, result: &SearchResult) -> Result<String, WatchError> {
        Ok(format!("{}#{}", self.repo_url, result.newfile))
    }

    fn newfile_base(&self, result: &SearchResult) -> String {
        format!("{}.tar", result.newfile.replace('/', "-"))
    }

    fn clean(&mut self) -> Result<(), WatchError> {
        if let Some(dir) = self.work_dir.take() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;
        }
        Ok(())
    }
}

pub(crate) fn is_head_like(refspec: &str) -> bool {
    refspec == "HEAD" || refspec.starts_with("heads/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_like_refs_are_shallow_eligible() {
        assert!(is_head_like("HEAD"));
        assert!(is_head_like("heads/main"));
        assert!(!is_head_like("refs/tags/v1.0"));
    }

    #[test]
    fn newfile_base_sanitizes_ref_slashes() {
        let s = GitSearcher::new("https://example.org/foo.git", "HEAD");
        let result = SearchResult { newfile: "refs/tags/v1.0".to_string(), newversion: "1.0".to_string(), sigfile: None };
        assert_eq!(s.newfile_base(&result), "refs-tags-v1.0.tar");
    }

    #[test]
    fn upstream_url_appends_ref_fragment() {
        let s = GitSearcher::new("https://example.org/foo.git", "HEAD");
        let result = SearchResult { newfile: "v1.0".to_string(), newversion: "1.0".to_string(), sigfile: None };
        assert_eq!(s.upstream_url(&result).unwrap(), "https://example.org/foo.git#v1.0");
    }
}

pub(crate) fn ephemeral_dir(prefix: &str) -> Result<PathBuf, WatchError> {
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!("{}-{}-{}", prefix, pid, nonce));
    std::fs::create_dir_all(&dir).map_err(|e| WatchError::new(Kind::Filesystem, &e.to_string()))?;
    Ok(dir)
}

pub(crate) fn run(cmd: &mut Command) -> Result<String, WatchError> {
    let output = cmd.output().map_err(|e| WatchError::new(Kind::ToolMissing, &e.to_string()))?;
    if !output.status.success() {
        return Err(WatchError::new(
            Kind::External,
            &format!("{:?} failed: {}", cmd, String::from_utf8_lossy(&output.stderr)),
        ));
    }
    String::from_utf8(output.stdout).map_err(|e| WatchError::new(Kind::External, &e.to_string()))
}
