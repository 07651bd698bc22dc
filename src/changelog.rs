//! Reads the first stanza of `debian/changelog`.

use crate::error::{Kind, WatchError};
use crate::version::PackageVersion;
use regex::Regex;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub source_name: String,
    pub full_version: String,
    pub upstream_version: String,
}

/// `name (version) distribution; urgency=...`
pub fn read_changelog(path: &Path) -> Result<ChangelogEntry, WatchError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WatchError::new(Kind::Filesystem, &format!("{}: {}", path.display(), e)))?;

    let re = Regex::new(r"^(\S+) \(([^)]+)\) (\S+); urgency=").unwrap();
    let first_line = content
        .lines()
        .find(|l| re.is_match(l))
        .ok_or_else(|| WatchError::new(Kind::Parse, "changelog has no recognizable first entry"))?;

    let cap = re.captures(first_line).unwrap();
    let source_name = cap[1].to_string();
    let full_version = cap[2].to_string();

    let parsed = PackageVersion::parse(&full_version)?;
    let upstream_version = parsed.upstream_version.version.clone();

    Ok(ChangelogEntry { source_name, full_version, upstream_version })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_first_stanza() {
        let dir = std::env::temp_dir().join(format!("watchscan-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("changelog");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "foo (1.2.3-1) unstable; urgency=medium").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "  * Initial release.").unwrap();

        let entry = read_changelog(&path).unwrap();
        assert_eq!(entry.source_name, "foo");
        assert_eq!(entry.full_version, "1.2.3-1");
        assert_eq!(entry.upstream_version, "1.2.3");

        std::fs::remove_dir_all(&dir).ok();
    }
}
