//! HTML/plain-text page searcher: fetches the base URL, optionally mangles
//! the page body, extracts an in-page `<base href>`, then matches every
//! `<a href>` (or, in `searchmode=plain`, the whole body) against the
//! line's file pattern.

use super::{select_best, SearchResult, Searcher};
use crate::error::WatchError;
use crate::fetch::Fetcher;
use crate::mangle;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Html,
    Plain,
}

pub struct HttpSearcher {
    pub base: String,
    pub pattern: Regex,
    pub mode: SearchMode,
    pub pagemangle: Vec<String>,
    pub downloadurlmangle: Vec<String>,
    pub versionless: bool,
    pub download_version: Option<String>,
    fetcher: Fetcher,
}

impl HttpSearcher {
    pub fn new(base: &str, pattern: Regex, mode: SearchMode) -> HttpSearcher {
        HttpSearcher {
            base: base.to_string(),
            pattern,
            mode,
            pagemangle: Vec::new(),
            downloadurlmangle: Vec::new(),
            versionless: false,
            download_version: None,
            fetcher: Fetcher::new(),
        }
    }

    fn extract_base_href(body: &str) -> Option<String> {
        let re = Regex::new(r#"(?i)<base\s+href\s*=\s*["']?([^"'>\s]+)"#).ok()?;
        re.captures(body).map(|c| c[1].to_string())
    }

    fn candidates(&self, body: &str, effective_base: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        match self.mode {
            SearchMode::Html => {
                let href_re = Regex::new(r#"(?i)<a\s+[^>]*href\s*=\s*["']?([^"'>\s]+)"#).unwrap();
                for cap in href_re.captures_iter(body) {
                    let href = cap[1].trim().replace(['\n', '\r'], "");
                    self.consider(&href, effective_base, &mut out);
                }
            }
            SearchMode::Plain => {
                for cap in self.pattern.captures_iter(body) {
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
                    out.push((version, cap[0].to_string()));
                }
            }
        }
        out
    }

    fn consider(&self, href: &str, effective_base: &str, out: &mut Vec<(String, String)>) {
        let resolved = canonicalize(effective_base, href);
        let path = resolved.rsplit('/').next().unwrap_or(&resolved);
        if let Some(cap) = self.pattern.captures(path).or_else(|| self.pattern.captures(&resolved)) {
            let groups: Vec<Option<String>> =
                (1..cap.len()).map(|i| cap.get(i).map(|m| m.as_str().to_string())).collect();
            let version = if groups.is_empty() {
                String::new()
            } else {
                super::version_from_captures(&groups)
            };
            if !self.versionless && version.is_empty() {
                return;
            }
            out.push((version, resolved));
        }
    }
}

impl Searcher for HttpSearcher {
    fn search(&mut self) -> Result<Option<SearchResult>, WatchError> {
        let response = self.fetcher.get(&self.base)?;
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let body = self
            .pagemangle
            .iter()
            .fold(body, |acc, rule| mangle::apply(rule, &acc));

        let effective_base = Self::extract_base_href(&body).unwrap_or(response.final_url.clone());

        let candidates = self.candidates(&body, &effective_base);
        let best = select_best(candidates, self.download_version.as_deref());

        match best {
            None => Ok(None),
            Some((version, mut file)) => {
                for rule in &self.downloadurlmangle {
                    file = mangle::apply(rule, &file);
                }
                Ok(Some(SearchResult { newfile: file, newversion: version, sigfile: None }))
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

fn canonicalize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = if base.starts_with("https://") { "https" } else { "http" };
        return format!("{}://{}", scheme, rest);
    }
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = base[scheme_end..].find('/').map(|i| scheme_end + i).unwrap_or(base.len());
    let authority = &base[..authority_end];
    if href.starts_with('/') {
        return normalize_dots(&format!("{}{}", authority, href));
    }
    let dir = match base.rfind('/') {
        Some(i) if i >= authority_end => &base[..=i],
        _ => authority,
    };
    normalize_dots(&format!("{}{}", dir, href))
}

fn normalize_dots(url: &str) -> String {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = url[scheme_end..].find('/').map(|i| scheme_end + i).unwrap_or(url.len());
    let (authority, path) = url.split_at(authority_end);
    let mut stack: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    format!("{}/{}", authority, stack.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_relative() {
        assert_eq!(
            canonicalize("https://example.com/dir/index.html", "file-1.2.tar.gz"),
            "https://example.com/dir/file-1.2.tar.gz"
        );
    }

    #[test]
    fn canonicalize_dotdot() {
        assert_eq!(
            canonicalize("https://example.com/dir/sub/index.html", "../file-1.2.tar.gz"),
            "https://example.com/dir/file-1.2.tar.gz"
        );
    }

    #[test]
    fn html_candidates_extract_version() {
        let pattern = Regex::new(r"foo-([\d.]+)\.tar\.gz").unwrap();
        let searcher = HttpSearcher::new("https://example.com/", pattern, SearchMode::Html);
        let body = r#"<a href="foo-1.2.tar.gz">foo-1.2.tar.gz</a> <a href="foo-1.3.tar.gz">foo-1.3.tar.gz</a>"#;
        let candidates = searcher.candidates(body, "https://example.com/");
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().any(|(v, _)| v == "1.3"));
    }
}
