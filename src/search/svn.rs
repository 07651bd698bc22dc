//! Subversion searcher. Versionless lines read the last-changed revision;
//! tagged lines match `svn list` entries against the line's pattern.

use super::{select_best, SearchResult, Searcher};
use crate::error::WatchError;
use crate::search::git::run;
use regex::Regex;
use std::process::Command;

pub struct SvnSearcher {
    pub base: String,
    pub pattern: Option<Regex>,
    pub versionless: bool,
}

impl SvnSearcher {
    pub fn new(base: &str) -> SvnSearcher {
        SvnSearcher { base: base.to_string(), pattern: None, versionless: true }
    }
}

impl Searcher for SvnSearcher {
    fn search(&mut self) -> Result<Option<SearchResult>, WatchError> {
        if self.versionless {
            let mut cmd = Command::new("svn");
            cmd.args(["info", "--show-item", "last-changed-revision", &self.base]);
            let out = run(&mut cmd)?;
            let rev = out.trim();
            return Ok(Some(SearchResult {
                newfile: self.base.clone(),
                newversion: format!("0.0~svn{}", rev),
                sigfile: None,
            }));
        }

        let pattern = self
            .pattern
            .as_ref()
            .ok_or_else(|| crate::error::WatchError::new(crate::error::Kind::Config, "svn searcher needs a pattern or versionless"))?;

        let mut cmd = Command::new("svn");
        cmd.args(["list", &self.base]);
        let out = run(&mut cmd)?;

        let mut candidates: Vec<(String, String)> = Vec::new();
        for entry in out.lines() {
            let entry = entry.trim_end_matches('/');
            if let Some(cap) = pattern.captures(entry) {
                let groups: Vec<Option<String>> =
                    (1..cap.len()).map(|i| cap.get(i).map(|m| m.as_str().to_string())).collect();
                candidates.push((super::version_from_captures(&groups), entry.to_string()));
            }
        }

        Ok(select_best(candidates, None).map(|(version, entry)| SearchResult {
            newfile: format!("{}/{}", self.base.trim_end_matches('/'), entry),
            newversion: version,
            sigfile: None,
        }))
    }

    fn upstream_url(&self, result: &SearchResult) -> Result<String, WatchError> {
        Ok(result.newfile.clone())
    }

    fn newfile_base(&self, result: &SearchResult) -> String {
        result.newfile.rsplit('/').next().unwrap_or(&result.newfile).to_string()
    }

    fn clean(&mut self) -> Result<(), WatchError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newfile_base_takes_last_path_segment() {
        let s = SvnSearcher::new("svn://example.org/repo/tags");
        let result = SearchResult {
            newfile: "svn://example.org/repo/tags/foo-1.0".to_string(),
            newversion: "1.0".to_string(),
            sigfile: None,
        };
        assert_eq!(s.newfile_base(&result), "foo-1.0");
    }

    #[test]
    fn versionless_default_is_true() {
        let s = SvnSearcher::new("svn://example.org/repo/trunk");
        assert!(s.versionless);
        assert!(s.pattern.is_none());
    }
}
