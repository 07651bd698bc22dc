//! Protocol Searchers: the four peer strategies that locate the newest
//! candidate upstream artifact or ref described by a watch line.

pub mod ftp;
pub mod git;
pub mod http;
pub mod svn;

use crate::error::WatchError;

/// Outcome of one search: `None` when nothing matched (an empty `newversion`
/// means `MatchEmpty`, handled by the caller).
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub newfile: String,
    pub newversion: String,
    pub sigfile: Option<String>,
}

/// The capability set shared by every protocol strategy.
pub trait Searcher {
    fn search(&mut self) -> Result<Option<SearchResult>, WatchError>;
    fn upstream_url(&self, result: &SearchResult) -> Result<String, WatchError>;
    fn newfile_base(&self, result: &SearchResult) -> String;
    fn clean(&mut self) -> Result<(), WatchError>;
}

/// Rank two `(version, kind)` candidates the way the HTTP/FTP searchers do:
/// higher version wins; on a tie, prefer the less lossy archive compression.
pub fn archive_priority(ext: &str) -> u8 {
    match ext {
        "tar.xz" | "txz" => 4,
        "tar.lzma" => 3,
        "tar.bz2" | "tbz2" => 2,
        "tar.gz" | "tgz" => 1,
        "zip" => 1,
        _ => 0,
    }
}

/// Build a version string from capture groups the way both HTML/FTP
/// searchers do: non-empty groups joined with `.`.
pub fn version_from_captures(captures: &[Option<String>]) -> String {
    captures
        .iter()
        .filter_map(|c| c.clone())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Select the best candidate given an optional target version to match
/// against (full match, or partial match on the first 1/2/3 dotted
/// components), mirroring `download_version`/`versionmode` handling.
pub fn select_best(
    candidates: Vec<(String, String)>,
    target: Option<&str>,
) -> Option<(String, String)> {
    let mut eligible: Vec<(String, String)> = match target {
        None => candidates,
        Some(t) => {
            let exact: Vec<_> = candidates.iter().filter(|(v, _)| v == t).cloned().collect();
            if !exact.is_empty() {
                exact
            } else {
                candidates
                    .into_iter()
                    .filter(|(v, _)| partial_match(v, t))
                    .collect()
            }
        }
    };

    eligible.sort_by(|a, b| {
        let pa = crate::version::PackageVersion::parse_lenient(&a.0);
        let pb = crate::version::PackageVersion::parse_lenient(&b.0);
        pb.partial_cmp(&pa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| archive_priority(extract_archive_ext(&b.1)).cmp(&archive_priority(extract_archive_ext(&a.1))))
    });
    eligible.into_iter().next()
}

/// Recovers the archive extension from a candidate href/filename so ties
/// at equal version can be broken by `archive_priority`.
fn extract_archive_ext(name: &str) -> &str {
    const KNOWN: [&str; 8] = ["tar.xz", "tar.lzma", "tar.bz2", "tar.gz", "tgz", "tbz2", "txz", "zip"];
    KNOWN.iter().copied().find(|ext| name.ends_with(ext)).unwrap_or("")
}

fn partial_match(candidate: &str, target: &str) -> bool {
    for n in [3usize, 2, 1] {
        let target_prefix: Vec<&str> = target.split('.').take(n).collect();
        if target_prefix.len() < n {
            continue;
        }
        let candidate_prefix: Vec<&str> = candidate.split('.').take(n).collect();
        if candidate_prefix == target_prefix {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_priority_prefers_xz() {
        assert!(archive_priority("tar.xz") > archive_priority("tar.gz"));
    }

    #[test]
    fn select_best_prefers_highest_version() {
        let candidates = vec![
            ("1.0".to_string(), "a-1.0.tar.gz".to_string()),
            ("2.0".to_string(), "a-2.0.tar.gz".to_string()),
        ];
        let best = select_best(candidates, None).unwrap();
        assert_eq!(best.0, "2.0");
    }

    #[test]
    fn select_best_partial_match() {
        let candidates = vec![
            ("1.2.3".to_string(), "a".to_string()),
            ("1.2.9".to_string(), "b".to_string()),
        ];
        let best = select_best(candidates, Some("1.2.0")).unwrap();
        assert_eq!(best.0, "1.2.9");
    }

    #[test]
    fn select_best_breaks_version_tie_on_archive_priority() {
        let candidates = vec![
            ("2.0".to_string(), "foo-2.0.tar.gz".to_string()),
            ("2.0".to_string(), "foo-2.0.tar.xz".to_string()),
            ("2.0".to_string(), "foo-2.0.tar.bz2".to_string()),
        ];
        let best = select_best(candidates, None).unwrap();
        assert_eq!(best.1, "foo-2.0.tar.xz");
    }

    #[test]
    fn extract_archive_ext_matches_known_suffixes() {
        assert_eq!(extract_archive_ext("foo-1.0.tar.xz"), "tar.xz");
        assert_eq!(extract_archive_ext("foo-1.0.tar.gz"), "tar.gz");
        assert_eq!(extract_archive_ext("foo-1.0.zip"), "zip");
        assert_eq!(extract_archive_ext("README"), "");
    }
}
