//! Reads a watch file, expands placeholders, instantiates `WatchLine`s, and
//! runs them either independently or as a `group`/`checksum` composition
//! that builds a single composite upstream version out of several
//! components.

use crate::changelog::ChangelogEntry;
use crate::download::Downloader;
use crate::error::{Kind, WatchError};
use crate::verify::Keyring;
use crate::watchline::{LineOptions, LineType, SharedState, VersionMode, WatchLine};
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct WatchFile {
    pub format_version: u8,
    pub lines: Vec<WatchLine>,
    /// The changelog-derived local upstream version, used as the default
    /// last-version for any line (or group component) that omits one.
    package_version: String,
    downloader: Downloader,
    already_downloaded: HashSet<String>,
}

/// Outcome of running a whole watch file: one composite result per
/// group/checksum block (or one per plain line), ready for DEHS rendering.
pub struct LineOutcome {
    pub status: String,
    pub upstream_version: Option<String>,
    pub upstream_url: Option<String>,
    pub target_path: Option<PathBuf>,
    pub decoded_checksum: Option<String>,
}

/// Expands `@PACKAGE@`, `@ANY_VERSION@`, `@ARCHIVE_EXT@`, `@SIGNATURE_EXT@`,
/// `@DEB_EXT@` verbatim before parsing.
fn expand_placeholders(text: &str, changelog: &ChangelogEntry) -> String {
    text.replace("@PACKAGE@", &changelog.source_name)
        .replace("@ANY_VERSION@", r"[-_]?(\d[\-+\.:~\da-zA-Z]*)")
        .replace("@ARCHIVE_EXT@", r"\.(?:tar\.xz|tar\.gz|tar\.bz2|tar\.lzma|tgz|zip)")
        .replace("@SIGNATURE_EXT@", r"\.(?:asc|pgp|gpg|sig|sign)")
        .replace("@DEB_EXT@", r"[\+~](debian|dfsg|ds|deb)(\.)?\d*$")
}

/// Joins `\`-continued lines; format >=4 left-trims the continuation.
fn join_continuations(raw: &str, format_version: u8) -> Vec<String> {
    let mut joined = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        let line = if current.is_empty() { line } else if format_version >= 4 { line.trim_start() } else { line };
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped);
        } else {
            current.push_str(line);
            joined.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        joined.push(current);
    }
    joined
}

fn parse_format_version(first_line: &str) -> u8 {
    let re = Regex::new(r"version\s*=\s*(\d+)").unwrap();
    re.captures(first_line).and_then(|c| c[1].parse().ok()).unwrap_or(1)
}

/// Splits a watch line's `opts="..." base file-pattern last-version action`
/// shape: four whitespace-delimited fields (base and file-pattern are
/// *separate* fields, mirroring the grounding source's
/// `line.split(maxsplit=3)`), not base-with-embedded-pattern split on `/`.
/// The version field is left empty when omitted; callers substitute the
/// real packaged version as a fallback, not a literal placeholder.
fn split_line(line: &str) -> (LineOptions, String, String, String, Option<String>) {
    let mut rest = line.trim();
    let mut options = LineOptions::default();

    if let Some(after) = rest.strip_prefix("opts=") {
        let (quoted, remainder) = take_quoted(after);
        options = LineOptions::parse(&quoted);
        rest = remainder.trim_start();
    }

    let fields = split_fields(rest, 4);
    let base = fields.first().cloned().unwrap_or_default();
    let pattern = fields.get(1).cloned().unwrap_or_default();
    let version = fields.get(2).cloned().unwrap_or_default();
    let action = fields.get(3).cloned();

    (options, base, pattern, version, action)
}

fn take_quoted(text: &str) -> (String, &str) {
    let text = text.trim_start();
    if let Some(rest) = text.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            return (rest[..end].to_string(), &rest[end + 1..]);
        }
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    (text[..end].to_string(), &text[end..])
}

/// Splits `text` on runs of whitespace into at most `max` fields, the way
/// `str.split(maxsplit=...)` does: the last field keeps any embedded
/// whitespace instead of being split further.
fn split_fields(text: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = text.trim_start();
    for _ in 0..max.saturating_sub(1) {
        if remaining.is_empty() {
            break;
        }
        let end = remaining.find(char::is_whitespace).unwrap_or(remaining.len());
        out.push(remaining[..end].to_string());
        remaining = remaining[end..].trim_start();
    }
    if !remaining.is_empty() {
        out.push(remaining.to_string());
    }
    out
}

/// Splits the packaged upstream version on `+~` into per-component
/// versions; a final component beginning with `cs` is the previous
/// checksum literal and is set aside.
pub fn split_packaged_version(upstream_version: &str) -> (Vec<String>, Option<String>) {
    let mut parts: Vec<String> = upstream_version.split("+~").map(|s| s.to_string()).collect();
    let checksum = match parts.last() {
        Some(last) if last.starts_with("cs") => Some(parts.pop().unwrap()[2..].to_string()),
        _ => None,
    };
    (parts, checksum)
}

impl WatchFile {
    pub fn downloader_mut(&mut self) -> &mut Downloader {
        &mut self.downloader
    }

    pub fn parse(path: &Path, changelog: &ChangelogEntry) -> Result<WatchFile, WatchError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WatchError::new(Kind::Filesystem, &format!("{}: {}", path.display(), e)))?;
        Self::parse_str(&raw, changelog)
    }

    pub fn parse_str(raw: &str, changelog: &ChangelogEntry) -> Result<WatchFile, WatchError> {
        let mut raw_lines = raw.lines();
        let first = raw_lines.find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
        let first = match first {
            Some(l) => l,
            None => return Err(WatchError::new(Kind::Parse, "empty watch file")),
        };

        let version_re = Regex::new(r"^\s*version\s*=\s*\d+").unwrap();
        let (format_version, body_start) = if version_re.is_match(first) {
            (parse_format_version(first), raw.find(first).unwrap() + first.len())
        } else {
            (1, 0)
        };
        if format_version < 4 {
            log::warn!("[watchfile] watch file format version {} is legacy", format_version);
        }

        let body = &raw[body_start..];
        let expanded = expand_placeholders(body, changelog);
        let directives: Vec<String> = join_continuations(&expanded, format_version)
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();

        let mut lines = Vec::new();
        let mut group_shared: Option<Rc<RefCell<SharedState>>> = None;
        let line_no_base = if body_start > 0 { 2 } else { 1 };

        for (idx, directive) in directives.iter().enumerate() {
            let line_no = idx + line_no_base;
            let (options, base, pattern, version, action) = split_line(directive);

            let line_type = match options.line_type_hint.as_deref() {
                Some("checksum") => LineType::Checksum,
                Some("group") => LineType::Group,
                _ if options.component.is_some() => LineType::Component,
                _ => LineType::Plain,
            };

            let shared = match (&line_type, &group_shared) {
                (LineType::Group, Some(s)) | (LineType::Checksum, Some(s)) | (LineType::Component, Some(s)) => s.clone(),
                _ => Rc::new(RefCell::new(SharedState::default())),
            };
            if line_type != LineType::Plain {
                group_shared = Some(shared.clone());
            } else {
                group_shared = None;
            }

            lines.push(WatchLine::new(line_no, line_type, options, &base, &pattern, &version, action, shared));
        }

        Ok(WatchFile {
            format_version,
            lines,
            package_version: changelog.upstream_version.clone(),
            downloader: Downloader::new(),
            already_downloaded: HashSet::new(),
        })
    }

    /// Runs every line's pipeline, composing group/checksum versions where
    /// applicable, and returns the process exit status (max of line
    /// statuses, Debian-uscan style: 0 ok, 1 a line failed/no match).
    pub fn process_lines(
        &mut self,
        package: &str,
        destdir: &Path,
        download_version: Option<&str>,
        keyring: Option<&Keyring>,
    ) -> (i32, Vec<LineOutcome>) {
        let mut exit_status = 0;
        let mut outcomes = Vec::new();

        if let Some(v) = download_version {
            for line in self.lines.iter() {
                line.shared.borrow_mut().download_version = Some(v.to_string());
            }
        }

        // Partition into independent runs: a maximal run of `Plain` lines is
        // its own unit; a maximal run of `Group`/`Checksum` lines sharing
        // the same `SharedState` runs as one composite unit.
        let mut i = 0;
        while i < self.lines.len() {
            if self.lines[i].line_type == LineType::Plain {
                let status = self.run_plain_line(i, package, destdir, keyring);
                exit_status = exit_status.max(status.0);
                outcomes.push(status.1);
                i += 1;
                continue;
            }

            let start = i;
            while i < self.lines.len() && self.lines[i].line_type != LineType::Plain {
                i += 1;
            }
            let (status, outcome) = self.run_group(start, i, package, destdir, keyring);
            exit_status = exit_status.max(status);
            outcomes.push(outcome);
        }

        (exit_status, outcomes)
    }

    fn run_plain_line(
        &mut self,
        idx: usize,
        package: &str,
        destdir: &Path,
        keyring: Option<&Keyring>,
    ) -> (i32, LineOutcome) {
        let line = &mut self.lines[idx];
        if line.last_version.is_empty() {
            line.last_version = self.package_version.clone();
        }

        if let Err(e) = line.parse() {
            log::warn!("{}", e);
            return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None });
        }
        if let Err(e) = line.search() {
            log::warn!("{}", e);
            return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None });
        }
        if let Err(e) = line.resolve_url() {
            log::warn!("{}", e);
            return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None });
        }
        if let Err(e) = line.derive_base_name() {
            log::warn!("{}", e);
            return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None });
        }
        let new_version = match line.mangle_new_version() {
            Some(v) => v,
            None => return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None }),
        };
        let mode = match line.compare_versions(&new_version) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("{}", e);
                return (1, LineOutcome { status: "error".into(), upstream_version: None, upstream_url: None, target_path: None, decoded_checksum: None });
            }
        };

        if let Err(e) = line.download(&mut self.downloader, destdir, package, &mut self.already_downloaded, keyring) {
            log::warn!("{}", e);
            let fatal = e.is_fatal();
            line.clean();
            return (
                if fatal { 2 } else { 1 },
                LineOutcome { status: "error".into(), upstream_version: Some(new_version), upstream_url: None, target_path: None, decoded_checksum: None },
            );
        }
        if let Err(e) = line.repack(package, destdir) {
            log::warn!("{}", e);
            line.clean();
            return (1, LineOutcome { status: "error".into(), upstream_version: Some(new_version), upstream_url: None, target_path: None, decoded_checksum: None });
        }

        let status_text = match mode {
            VersionMode::Newer => "newer package available",
            VersionMode::Same => "up to date",
            VersionMode::Prev => "only older package available",
            VersionMode::Ignore => "package available",
        };

        let outcome = LineOutcome {
            status: status_text.to_string(),
            upstream_version: line.newversion().map(|s| s.to_string()),
            upstream_url: None,
            target_path: line.repacked_path.clone(),
            decoded_checksum: None,
        };
        line.clean();
        (0, outcome)
    }

    /// Runs a `group`/`checksum` block as a two-pass composite: pass one
    /// (parse/search/url/basename, plus compare for group lines) for every
    /// member; checksum synthesis; pass two (download/repack) honoring the
    /// shared `download` flag computed from pass one.
    fn run_group(
        &mut self,
        start: usize,
        end: usize,
        package: &str,
        destdir: &Path,
        keyring: Option<&Keyring>,
    ) -> (i32, LineOutcome) {
        let mut exit_status = 0;
        let mut per_line_versions: Vec<Option<String>> = Vec::new();

        // The local upstream version is split on `+~` and distributed to
        // group lines in order, with a trailing `cs<N>` component set
        // aside for checksum lines.
        let (mut components, checksum_literal) = split_packaged_version(&self.package_version);

        for idx in start..end {
            let line = &mut self.lines[idx];
            match line.line_type {
                LineType::Group | LineType::Component => {
                    let popped = if components.is_empty() { None } else { Some(components.remove(0)) };
                    if line.last_version.is_empty() {
                        line.last_version = popped.unwrap_or_else(|| "0".to_string());
                    }
                }
                LineType::Checksum => {
                    if line.last_version.is_empty() {
                        line.last_version = checksum_literal.clone().unwrap_or_else(|| "0".to_string());
                    }
                }
                LineType::Plain => {}
            }
            if let Err(e) = line.parse() {
                log::warn!("{}", e);
                exit_status = exit_status.max(1);
                per_line_versions.push(None);
                continue;
            }
            if let Err(e) = line.search() {
                log::warn!("{}", e);
                exit_status = exit_status.max(1);
                per_line_versions.push(None);
                continue;
            }
            if let Err(e) = line.resolve_url() {
                log::warn!("{}", e);
                exit_status = exit_status.max(1);
                per_line_versions.push(None);
                continue;
            }
            if let Err(e) = line.derive_base_name() {
                log::warn!("{}", e);
                exit_status = exit_status.max(1);
                per_line_versions.push(None);
                continue;
            }
            let v = line.mangle_new_version();
            if line.line_type == LineType::Group || line.line_type == LineType::Component {
                if let Some(v) = &v {
                    if let Err(e) = line.compare_versions(v) {
                        log::warn!("{}", e);
                        exit_status = exit_status.max(1);
                    }
                }
            }
            per_line_versions.push(v);
        }

        // Checksum synthesis: sum digit-run fields across checksum lines.
        let checksum_versions: Vec<String> = (start..end)
            .zip(per_line_versions.iter())
            .filter(|&(i, _)| self.lines[i].line_type == LineType::Checksum)
            .filter_map(|(_, v)| v.clone())
            .collect();

        let checksum_value = if !checksum_versions.is_empty() {
            match checksum_sum(&checksum_versions) {
                Ok(sum) => Some(sum),
                Err(e) => {
                    log::warn!("{}", e);
                    exit_status = exit_status.max(2);
                    None
                }
            }
        } else {
            None
        };

        // Pass two: download/repack, honoring shared.download computed
        // during pass one's `compare_versions` calls.
        for idx in start..end {
            let line = &mut self.lines[idx];
            if let Err(e) = line.download(&mut self.downloader, destdir, package, &mut self.already_downloaded, keyring) {
                log::warn!("{}", e);
                exit_status = exit_status.max(if e.is_fatal() { 2 } else { 1 });
                continue;
            }
            if let Err(e) = line.repack(package, destdir) {
                log::warn!("{}", e);
                exit_status = exit_status.max(1);
            }
        }

        let component_versions: Vec<String> = (start..end)
            .zip(per_line_versions.iter())
            .filter(|&(i, _)| matches!(self.lines[i].line_type, LineType::Group | LineType::Component))
            .filter_map(|(_, v)| v.clone())
            .collect();

        let mut composite_parts = component_versions.clone();
        if let Some(cs) = &checksum_value {
            composite_parts.push(format!("cs{}", cs));
        }
        let composite_version = composite_parts.join("+~");

        if !composite_version.is_empty() {
            rename_group_artifacts(&mut self.lines[start..end], &component_versions, &composite_version);
        }

        for idx in start..end {
            self.lines[idx].clean();
        }

        let target_path = (start..end).find_map(|i| self.lines[i].repacked_path.clone());

        let outcome = LineOutcome {
            status: if exit_status == 0 { "group processed".to_string() } else { "error".to_string() },
            upstream_version: if composite_version.is_empty() { None } else { Some(composite_version) },
            upstream_url: None,
            target_path,
            decoded_checksum: checksum_value,
        };

        (exit_status, outcome)
    }
}

/// Renames each group member's downloaded/repacked artifact (and any
/// sibling `.asc`/`.sig` signature) so its per-component version is
/// replaced by the composite version.
fn rename_group_artifacts(lines: &mut [WatchLine], component_versions: &[String], composite: &str) {
    let members = lines
        .iter_mut()
        .filter(|line| matches!(line.line_type, LineType::Group | LineType::Component));
    for (line, component_version) in members.zip(component_versions.iter()) {
        if component_version == composite {
            continue;
        }
        for path in [line.repacked_path.clone(), line.downloaded_path.clone()].into_iter().flatten() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.contains(component_version.as_str()) {
                    let renamed_name = name.replacen(component_version.as_str(), composite, 1);
                    let renamed = path.with_file_name(&renamed_name);
                    if std::fs::rename(&path, &renamed).is_ok() {
                        for ext in ["asc", "sig"] {
                            let sibling = path.with_extension(ext);
                            if sibling.exists() {
                                let renamed_sibling = renamed.with_extension(ext);
                                let _ = std::fs::rename(&sibling, &renamed_sibling);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Sums digit-run fields of a set of component versions into a composite
/// checksum version string, per the checksum line's arithmetic. Every
/// component version must decompose into digit-run fields only.
pub fn checksum_sum(components: &[String]) -> Result<String, WatchError> {
    let split: Result<Vec<Vec<u64>>, WatchError> = components
        .iter()
        .map(|c| version_split_digits(c))
        .collect();
    let split = split?;

    let width = split.iter().map(|v| v.len()).max().unwrap_or(0);
    let mut sums = vec![0u64; width];
    for fields in &split {
        for (i, v) in fields.iter().enumerate() {
            sums[i] += v;
        }
    }

    Ok(sums.iter().map(|n| n.to_string()).collect::<Vec<_>>().join("."))
}

fn version_split_digits(version: &str) -> Result<Vec<u64>, WatchError> {
    version
        .split('.')
        .map(|field| {
            field
                .parse::<u64>()
                .map_err(|_| WatchError::new(Kind::Parse, &format!("non-digit checksum field: {}", field)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changelog() -> ChangelogEntry {
        ChangelogEntry {
            source_name: "foo".to_string(),
            full_version: "1.0-1".to_string(),
            upstream_version: "1.0".to_string(),
        }
    }

    #[test]
    fn parses_format_version() {
        assert_eq!(parse_format_version("version=4"), 4);
        assert_eq!(parse_format_version("version = 3"), 3);
    }

    #[test]
    fn joins_backslash_continuations() {
        let joined = join_continuations("a\\\nb\nc", 4);
        assert_eq!(joined, vec!["ab".to_string(), "c".to_string()]);
    }

    #[test]
    fn expands_package_placeholder() {
        let cl = changelog();
        let out = expand_placeholders("https://example.com/@PACKAGE@/", &cl);
        assert_eq!(out, "https://example.com/foo/");
    }

    #[test]
    fn parses_single_plain_line() {
        let text = "version=4\nhttps://example.com/foo/ foo-(\\d[\\d.]*)\\.tar\\.gz\n";
        let wf = WatchFile::parse_str(text, &changelog()).unwrap();
        assert_eq!(wf.format_version, 4);
        assert_eq!(wf.lines.len(), 1);
        assert_eq!(wf.lines[0].line_type, LineType::Plain);
        assert_eq!(wf.lines[0].raw_base, "https://example.com/foo/");
        assert_eq!(wf.lines[0].raw_pattern, "foo-(\\d[\\d.]*)\\.tar\\.gz");
    }

    #[test]
    fn split_fields_keeps_base_and_pattern_separate() {
        let fields = split_fields("https://example.org/dl/ foo-([\\d.]+)\\.tar\\.xz", 4);
        assert_eq!(fields[0], "https://example.org/dl/");
        assert_eq!(fields[1], "foo-([\\d.]+)\\.tar\\.xz");
    }

    #[test]
    fn plain_line_defaults_last_version_to_changelog_upstream_version() {
        let text = "version=4\nhttps://example.com/foo/ foo-(\\d[\\d.]*)\\.tar\\.gz\n";
        let wf = WatchFile::parse_str(text, &changelog()).unwrap();
        assert_eq!(wf.lines[0].last_version, "");
        assert_eq!(wf.package_version, "1.0");
    }

    #[test]
    fn checksum_sum_adds_digit_fields() {
        let components = vec!["1.2.3".to_string(), "0.1.0".to_string()];
        assert_eq!(checksum_sum(&components).unwrap(), "1.3.3");
    }

    #[test]
    fn checksum_sum_rejects_non_digit_field() {
        let components = vec!["1.a.3".to_string()];
        assert!(checksum_sum(&components).is_err());
    }

    #[test]
    fn splits_packaged_version_on_plus_tilde() {
        let (parts, checksum) = split_packaged_version("1.0+~0.9+~cs10");
        assert_eq!(parts, vec!["1.0".to_string(), "0.9".to_string()]);
        assert_eq!(checksum, Some("10".to_string()));
    }

    #[test]
    fn splits_packaged_version_without_checksum() {
        let (parts, checksum) = split_packaged_version("1.0+~0.9");
        assert_eq!(parts, vec!["1.0".to_string(), "0.9".to_string()]);
        assert_eq!(checksum, None);
    }
}
