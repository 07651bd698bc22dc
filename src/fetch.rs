//! HTTP/FTP fetch wrapper that records the full redirect chain without
//! following cycles, and strips `Referer` for a configured set of host
//! suffixes. Built directly on `curl::easy::Easy`, the same blocking client
//! the rest of the crate already uses for plain downloads.

use crate::error::{Kind, WatchError};
use curl::easy::{Easy, List};
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Debian uscan (watchscan)";

pub struct Fetcher {
    user_agent: String,
    timeout: Duration,
    no_referer_hosts: Vec<String>,
    custom_headers: Vec<(String, String, String)>,
    redirections: Vec<String>,
}

pub struct Response {
    pub body: Vec<u8>,
    pub final_url: String,
    pub status: u32,
}

impl Default for Fetcher {
    fn default() -> Self {
        Fetcher {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(60),
            no_referer_hosts: vec!["github.com".to_string(), "sourceforge.net".to_string()],
            custom_headers: Vec::new(),
            redirections: Vec::new(),
        }
    }
}

impl Fetcher {
    pub fn new() -> Fetcher {
        Fetcher::default()
    }

    pub fn with_user_agent(mut self, ua: &str) -> Fetcher {
        self.user_agent = ua.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Fetcher {
        self.timeout = timeout;
        self
    }

    /// `url-prefix@header-name: value`, matched by prefix on the request URL.
    pub fn add_header(&mut self, url_prefix: &str, header: &str, value: &str) {
        self.custom_headers.push((url_prefix.to_string(), header.to_string(), value.to_string()));
    }

    pub fn redirections(&self) -> &[String] {
        &self.redirections
    }

    pub fn clear_redirections(&mut self) {
        self.redirections.clear();
    }

    fn strip_referer(&self, url: &str) -> bool {
        self.no_referer_hosts.iter().any(|suffix| host_matches(url, suffix))
    }

    /// Perform a GET, following redirects by hand so every hop is recorded
    /// and cycles are refused instead of looping forever.
    pub fn get(&mut self, url: &str) -> Result<Response, WatchError> {
        self.clear_redirections();
        let mut current = url.to_string();
        let mut referer: Option<String> = None;
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            if !seen.insert(current.clone()) {
                return Err(WatchError::new(
                    Kind::Network,
                    &format!("redirect cycle detected at {}", current),
                ));
            }
            self.redirections.push(current.clone());

            let (status, body, location) = self.single_request(&current, referer.as_deref())?;

            match location {
                Some(next) if (300..400).contains(&status) => {
                    referer = Some(current.clone());
                    current = resolve_redirect(&current, &next);
                    continue;
                }
                _ => {
                    return Ok(Response { body, final_url: current, status });
                }
            }
        }
    }

    fn single_request(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<(u32, Vec<u8>, Option<String>), WatchError> {
        let mut easy = Easy::new();
        easy.url(url).map_err(curl_err)?;
        easy.useragent(&self.user_agent).map_err(curl_err)?;
        easy.timeout(self.timeout).map_err(curl_err)?;
        easy.follow_location(false).map_err(curl_err)?;

        if let Some(prev_url) = referer {
            if !self.strip_referer(url) {
                easy.referer(prev_url).map_err(curl_err)?;
            }
        }

        let mut headers = List::new();
        for (prefix, name, value) in &self.custom_headers {
            if url.starts_with(prefix.as_str()) {
                headers.append(&format!("{}: {}", name, value)).map_err(curl_err)?;
            }
        }
        easy.http_headers(headers).map_err(curl_err)?;

        let mut body = Vec::new();
        let mut location: Option<String> = None;
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|line| {
                    if let Ok(text) = std::str::from_utf8(line) {
                        if let Some(value) = text.strip_prefix("Location:").or_else(|| text.strip_prefix("location:")) {
                            location = Some(value.trim().to_string());
                        }
                    }
                    true
                })
                .map_err(curl_err)?;
            transfer
                .write_function(|data| {
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(curl_err)?;
            transfer.perform().map_err(curl_err)?;
        }

        let status = easy.response_code().map_err(curl_err)?;
        Ok((status, body, location))
    }
}

fn curl_err(e: curl::Error) -> WatchError {
    WatchError::new(Kind::Network, &e.to_string())
}

fn host_matches(url: &str, suffix: &str) -> bool {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    let host = host.rsplit('@').next().unwrap_or(host);
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

fn resolve_redirect(base: &str, location: &str) -> String {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.to_string();
    }
    if let Some(rest) = location.strip_prefix("//") {
        let scheme = if base.starts_with("https://") { "https" } else { "http" };
        return format!("{}://{}", scheme, rest);
    }
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = base[scheme_end..].find('/').map(|i| scheme_end + i).unwrap_or(base.len());
    let authority = &base[..authority_end];
    if location.starts_with('/') {
        format!("{}{}", authority, location)
    } else {
        let dir = match base.rfind('/') {
            Some(i) if i >= authority_end => &base[..=i],
            _ => authority,
        };
        format!("{}{}", dir, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_matches_suffix() {
        assert!(host_matches("https://raw.github.com/foo", "github.com"));
        assert!(host_matches("https://github.com/foo", "github.com"));
        assert!(!host_matches("https://nothub.com/foo", "github.com"));
    }

    #[test]
    fn resolve_redirect_absolute() {
        assert_eq!(
            resolve_redirect("https://a.example/x", "https://b.example/y"),
            "https://b.example/y"
        );
    }

    #[test]
    fn resolve_redirect_protocol_relative() {
        assert_eq!(
            resolve_redirect("https://a.example/x", "//b.example/y"),
            "https://b.example/y"
        );
    }

    #[test]
    fn resolve_redirect_path_absolute() {
        assert_eq!(
            resolve_redirect("https://a.example/dir/x", "/y"),
            "https://a.example/y"
        );
    }

    #[test]
    fn resolve_redirect_relative() {
        assert_eq!(
            resolve_redirect("https://a.example/dir/x", "y"),
            "https://a.example/dir/y"
        );
    }
}
