//! FTP directory listing searcher. Handles both HTMLized listings (as
//! returned by proxies that render FTP as HTML) and classic UNIX `ls -l`
//! style listings, plus a recursive directory-descent mode.

use super::{select_best, SearchResult, Searcher};
use crate::error::{Kind, WatchError};
use crate::fetch::Fetcher;
use crate::mangle;
use regex::Regex;

pub struct FtpSearcher {
    pub base: String,
    pub pattern: Regex,
    pub dirversionmangle: Vec<String>,
    pub downloadurlmangle: Vec<String>,
    pub versionless: bool,
    pub download_version: Option<String>,
    fetcher: Fetcher,
}

impl FtpSearcher {
    pub fn new(base: &str, pattern: Regex) -> FtpSearcher {
        FtpSearcher {
            base: base.to_string(),
            pattern,
            dirversionmangle: Vec::new(),
            downloadurlmangle: Vec::new(),
            versionless: false,
            download_version: None,
            fetcher: Fetcher::new(),
        }
    }

    fn list_entries(&mut self, url: &str) -> Result<Vec<String>, WatchError> {
        let response = self.fetcher.get(url)?;
        let body = String::from_utf8_lossy(&response.body).into_owned();

        if body.to_lowercase().contains("<a href") {
            let href_re = Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']?([^"'>\s]+)"#).unwrap();
            Ok(href_re.captures_iter(&body).map(|c| c[1].trim_end_matches('/').to_string()).collect())
        } else {
            Ok(body
                .lines()
                .filter(|l| !l.starts_with('d') && !l.trim().is_empty())
                .filter_map(|l| {
                    let field = l.split_whitespace().last()?;
                    Some(field.split(" -> ").next().unwrap_or(field).to_string())
                })
                .collect())
        }
    }

    fn candidates(&self, entries: &[String]) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for entry in entries {
            if let Some(cap) = self.pattern.captures(entry) {
                let groups: Vec<Option<String>> =
                    (1..cap.len()).map(|i| cap.get(i).map(|m| m.as_str().to_string())).collect();
                let version = if groups.is_empty() {
                    String::new()
                } else {
                    super::version_from_captures(&groups)
                };
                if !self.versionless && version.is_empty() {
                    continue;
                }
                out.push((version, entry.clone()));
            }
        }
        out
    }
}

impl Searcher for FtpSearcher {
    fn search(&mut self) -> Result<Option<SearchResult>, WatchError> {
        let entries = self.list_entries(&self.base.clone())?;
        let candidates = self.candidates(&entries);
        let best = select_best(candidates, self.download_version.as_deref());

        match best {
            None => Ok(None),
            Some((version, file)) => {
                let mut url = format!("{}/{}", self.base.trim_end_matches('/'), file);
                for rule in &self.downloadurlmangle {
                    url = mangle::apply(rule, &url);
                }
                Ok(Some(SearchResult { newfile: url, newversion: version, sigfile: None }))
            }
        }
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

/// Descend through parenthesized path components, ranking each directory
/// level with `dirversionmangle` and picking the newest before continuing.
pub fn resolve_recursive_path(
    fetcher: &mut Fetcher,
    base: &str,
    segments: &[Regex],
    dirversionmangle: &[String],
) -> Result<String, WatchError> {
    let mut current = base.trim_end_matches('/').to_string();
    for seg_pattern in segments {
        let response = fetcher.get(&current)?;
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let entries: Vec<String> = body
            .lines()
            .filter(|l| l.starts_with('d'))
            .filter_map(|l| l.split_whitespace().last().map(|s| s.to_string()))
            .collect();

        let mut candidates: Vec<(String, String)> = Vec::new();
        for entry in &entries {
            if let Some(cap) = seg_pattern.captures(entry) {
                let groups: Vec<Option<String>> =
                    (1..cap.len()).map(|i| cap.get(i).map(|m| m.as_str().to_string())).collect();
                let version = super::version_from_captures(&groups);
                let mangled = dirversionmangle.iter().fold(version, |v, r| mangle::apply(r, &v));
                candidates.push((mangled, entry.clone()));
            }
        }

        let best = select_best(candidates, None).ok_or_else(|| {
            WatchError::new(Kind::MatchEmpty, &format!("no matching directory under {}", current))
        })?;
        current = format!("{}/{}", current, best.1);
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn searcher() -> FtpSearcher {
        FtpSearcher::new("ftp://ftp.example.org/pub/foo", Regex::new(r"foo-([\d.]+)\.tar\.gz").unwrap())
    }

    #[test]
    fn candidates_extracts_version_from_classic_listing() {
        let s = searcher();
        let entries = vec!["foo-1.0.tar.gz".to_string(), "foo-2.0.tar.gz".to_string(), "README".to_string()];
        let cands = s.candidates(&entries);
        assert_eq!(cands.len(), 2);
        assert!(cands.iter().any(|(v, _)| v == "1.0"));
        assert!(cands.iter().any(|(v, _)| v == "2.0"));
    }

    #[test]
    fn candidates_skips_non_matching_entries() {
        let s = searcher();
        let entries = vec!["bar-1.0.tar.gz".to_string()];
        assert!(s.candidates(&entries).is_empty());
    }

    #[test]
    fn candidates_requires_versionless_flag_when_no_captures() {
        let mut s = FtpSearcher::new("ftp://ftp.example.org/pub/foo", Regex::new(r"latest\.tar\.gz").unwrap());
        let entries = vec!["latest.tar.gz".to_string()];
        assert!(s.candidates(&entries).is_empty());
        s.versionless = true;
        assert_eq!(s.candidates(&entries).len(), 1);
    }
}
