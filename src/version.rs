//! Package-manager style version comparison: `[EPOCH:]UPSTREAM[-REVISION]`,
//! with dpkg-style digit/non-digit block ordering and `~` sorting before
//! everything, including the empty string.

use crate::error::{Kind, WatchError};
use std::cmp::{max, Ordering};
use std::iter::repeat;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VersionBlock {
    pub prefix: String,
    pub number: u64,
}

impl VersionBlock {
    fn new() -> VersionBlock {
        VersionBlock {
            prefix: String::new(),
            number: 0,
        }
    }

    fn from(version: &str) -> Vec<VersionBlock> {
        if version.is_empty() {
            return Vec::new();
        }

        let mut blocks: Vec<VersionBlock> = Vec::new();

        let mut start = 0;
        let mut start_digit = 0;
        let mut digit = false;

        for (i, c) in version.chars().enumerate() {
            if c.is_ascii_digit() {
                if !digit {
                    start_digit = i;
                }
                digit = true;
                continue;
            }

            if digit {
                let prefix = version[start..start_digit].to_string();
                let number = version[start_digit..i].parse::<u64>().unwrap_or(0);
                blocks.push(VersionBlock { prefix, number });

                digit = false;
                start = i;
            }
        }

        let len = version.len();
        if !digit {
            start_digit = len;
        }
        let prefix = version[start..start_digit].to_string();
        let number = version[start_digit..len].parse::<u64>().unwrap_or(0);
        blocks.push(VersionBlock { prefix, number });

        blocks
    }
}

impl PartialOrd for VersionBlock {
    fn partial_cmp(&self, other: &VersionBlock) -> Option<Ordering> {
        if self.prefix == other.prefix {
            return self.number.partial_cmp(&other.number);
        }

        if self.prefix.is_empty() {
            return if other.prefix.starts_with('~') {
                Some(Ordering::Greater)
            } else {
                Some(Ordering::Less)
            };
        }

        if other.prefix.is_empty() {
            return if self.prefix.starts_with('~') {
                Some(Ordering::Less)
            } else {
                Some(Ordering::Greater)
            };
        }

        for (s, o) in self.prefix.chars().zip(other.prefix.chars()) {
            if s != o {
                return if s == '~' {
                    Some(Ordering::Less)
                } else if o == '~' {
                    Some(Ordering::Greater)
                } else {
                    s.partial_cmp(&o)
                };
            }
        }

        self.prefix.len().partial_cmp(&other.prefix.len())
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Version {
    pub version: String,
}

impl Version {
    pub fn new(version: &str) -> Version {
        Version {
            version: version.to_string(),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        let sl = VersionBlock::from(&self.version);
        let ol = VersionBlock::from(&other.version);

        let len = max(sl.len(), ol.len());

        let sl = sl.into_iter().chain(repeat(VersionBlock::new())).take(len);
        let ol = ol.into_iter().chain(repeat(VersionBlock::new())).take(len);

        for (sb, ob) in sl.zip(ol) {
            match sb.partial_cmp(&ob)? {
                Ordering::Equal => continue,
                other => return Some(other),
            }
        }

        Some(Ordering::Equal)
    }
}

/// `EPOCH:UPSTREAM-REVISION`, the only authority on "newer" in the engine.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PackageVersion {
    pub epoch: u64,
    pub upstream_version: Version,
    pub debian_revision: Version,
}

impl PackageVersion {
    /// Strict parse: malformed epochs are an error.
    pub fn parse(version: &str) -> Result<PackageVersion, WatchError> {
        let (epoch, tail) = match version.split_once(':') {
            Some((e, r)) => {
                let epoch = e
                    .parse::<u64>()
                    .map_err(|err| WatchError::new(Kind::Parse, &err.to_string()))?;
                (epoch, r)
            }
            None => (0, version),
        };

        let (upstream_version, debian_revision) = match tail.split_once('-') {
            Some((v, r)) => (v, r),
            None => (tail, ""),
        };

        Ok(PackageVersion {
            epoch,
            upstream_version: Version::new(upstream_version),
            debian_revision: Version::new(debian_revision),
        })
    }

    /// Non-strict parse used by `sort`/`upstream_sort`: an unparseable epoch
    /// is simply treated as absent rather than failing the whole sort.
    pub fn parse_lenient(version: &str) -> PackageVersion {
        PackageVersion::parse(version).unwrap_or_else(|_| PackageVersion {
            epoch: 0,
            upstream_version: Version::new(version),
            debian_revision: Version::new(""),
        })
    }

    /// Treat this version as if it carried no Debian revision, i.e. `1:V-0`.
    pub fn as_upstream_only(&self) -> PackageVersion {
        PackageVersion {
            epoch: 1,
            upstream_version: self.upstream_version.clone(),
            debian_revision: Version::new("0"),
        }
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &PackageVersion) -> Option<Ordering> {
        if self.epoch != other.epoch {
            self.epoch.partial_cmp(&other.epoch)
        } else if self.upstream_version != other.upstream_version {
            self.upstream_version.partial_cmp(&other.upstream_version)
        } else {
            self.debian_revision.partial_cmp(&other.debian_revision)
        }
    }
}

/// Stable descending sort by version, non-strict: unparseable entries sort
/// as their literal string with epoch 0 rather than aborting.
pub fn sort<T: Clone>(pairs: &[(String, T)]) -> Vec<(String, T)> {
    sort_by(pairs, |v| PackageVersion::parse_lenient(v))
}

/// Stable descending sort by version, strict: the first unparseable entry
/// aborts the whole sort.
pub fn deb_sort<T: Clone>(pairs: &[(String, T)]) -> Result<Vec<(String, T)>, WatchError> {
    let mut keyed = Vec::with_capacity(pairs.len());
    for (i, (v, t)) in pairs.iter().enumerate() {
        keyed.push((i, PackageVersion::parse(v)?, t.clone()));
    }
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    Ok(keyed.into_iter().map(|(_, v, t)| (v_to_string(&v), t)).collect())
}

/// Stable descending sort comparing each entry as if it had no revision.
pub fn upstream_sort<T: Clone>(pairs: &[(String, T)]) -> Vec<(String, T)> {
    sort_by(pairs, |v| PackageVersion::parse_lenient(v).as_upstream_only())
}

fn sort_by<T: Clone>(
    pairs: &[(String, T)],
    key: impl Fn(&str) -> PackageVersion,
) -> Vec<(String, T)> {
    let mut keyed: Vec<(usize, PackageVersion, String, T)> = pairs
        .iter()
        .enumerate()
        .map(|(i, (v, t))| (i, key(v), v.clone(), t.clone()))
        .collect();
    keyed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    keyed.into_iter().map(|(_, _, v, t)| (v, t)).collect()
}

fn v_to_string(v: &PackageVersion) -> String {
    let upstream = &v.upstream_version.version;
    let revision = &v.debian_revision.version;
    match (v.epoch, revision.is_empty()) {
        (0, true) => upstream.clone(),
        (0, false) => format!("{}-{}", upstream, revision),
        (e, true) => format!("{}:{}", e, upstream),
        (e, false) => format!("{}:{}-{}", e, upstream, revision),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parsing_works() {
        let v = PackageVersion::parse("1.2.6-1ubuntu1").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.upstream_version, Version::new("1.2.6"));
        assert_eq!(v.debian_revision, Version::new("1ubuntu1"));

        let v = PackageVersion::parse("3.20191218.1ubuntu2").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.upstream_version, Version::new("3.20191218.1ubuntu2"));
        assert_eq!(v.debian_revision, Version::new(""));

        let v = PackageVersion::parse("1:1.2.3-4.5.6").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.upstream_version, Version::new("1.2.3"));
        assert_eq!(v.debian_revision, Version::new("4.5.6"));
    }

    #[test]
    fn compare_versions_epoch() {
        let v1 = PackageVersion::parse("1.2.3-4.5.6").unwrap();
        let v2 = PackageVersion::parse("1:1.2.3-4.5.6").unwrap();
        assert!(v1 < v2);
        assert!(v1 == v1.clone());
    }

    #[test]
    fn compare_versions_upstream_tilde() {
        let v1 = PackageVersion::parse("1.2.3-4.5.6").unwrap();
        let v2 = PackageVersion::parse("~1-4.5.6").unwrap();
        assert!(v2 < v1);
    }

    #[test]
    fn compare_versions_debian_tilde() {
        let v1 = PackageVersion::parse("1.2.3-4.5.6").unwrap();
        let v2 = PackageVersion::parse("1.2.3-~6").unwrap();
        assert!(v2 < v1);
    }

    #[test]
    fn version_blocks() {
        let blocks = VersionBlock::from("1.2.3");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].number, 1);
        assert_eq!(blocks[0].prefix, "");
        assert_eq!(blocks[1].number, 2);
        assert_eq!(blocks[1].prefix, ".");
        assert_eq!(blocks[2].number, 3);
        assert_eq!(blocks[2].prefix, ".");
    }

    #[test]
    fn sort_is_stable_and_descending() {
        let pairs = vec![
            ("1.0".to_string(), "a"),
            ("2.0".to_string(), "b"),
            ("1.5".to_string(), "c"),
        ];
        let sorted = sort(&pairs);
        assert_eq!(sorted[0].0, "2.0");
        assert_eq!(sorted[1].0, "1.5");
        assert_eq!(sorted[2].0, "1.0");
    }

    #[test]
    fn deb_sort_rejects_malformed_epoch() {
        let pairs = vec![("x:1.0".to_string(), "a")];
        assert!(deb_sort(&pairs).is_err());
    }

    #[test]
    fn upstream_sort_ignores_revision() {
        let pairs = vec![
            ("1.0-5".to_string(), "older-revision"),
            ("1.0-1".to_string(), "newer-upstream-tie"),
        ];
        let sorted = upstream_sort(&pairs);
        // equal upstream component, both at revision-independent "1", order
        // falls back to original index (stability).
        assert_eq!(sorted[0].1, "older-revision");
    }
}
