//! Per-line pipeline state machine: Parse -> Search -> URL Resolve -> Base
//! Name -> Compare -> Download -> Repack -> Clean. Each stage short-circuits
//! the line on a non-zero status; `status` accumulates into the
//! orchestrator's process exit code.

use crate::download::{Downloader, GitRepoState, Protocol};
use crate::error::{Kind, WatchError};
use crate::mangle;
use crate::repack::{self, RepackRequest};
use crate::search::ftp::FtpSearcher;
use crate::search::git::GitSearcher;
use crate::search::http::{HttpSearcher, SearchMode};
use crate::search::svn::SvnSearcher;
use crate::search::{SearchResult, Searcher};
use crate::verify::Keyring;
use crate::version::PackageVersion;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Plain,
    Component,
    Group,
    Checksum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Http,
    Ftp,
    Git,
    Svn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgpMode {
    Default,
    Auto,
    Mangle,
    SelfSigned,
    Previous,
    Next,
    GitTag,
    None,
}

impl PgpMode {
    fn from_option(value: Option<&str>) -> PgpMode {
        match value {
            Some("auto") => PgpMode::Auto,
            Some("mangle") => PgpMode::Mangle,
            Some("self") => PgpMode::SelfSigned,
            Some("previous") => PgpMode::Previous,
            Some("next") => PgpMode::Next,
            Some("gittag") => PgpMode::GitTag,
            Some("none") => PgpMode::None,
            _ => PgpMode::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMode {
    Newer,
    Same,
    Prev,
    Ignore,
}

/// Per-group state, shared by every line in a `group`/`checksum` block.
/// Plain lines get a private, freshly-created instance.
#[derive(Debug, Default, Clone)]
pub struct SharedState {
    pub bare: bool,
    pub components: Vec<String>,
    pub common_newversion: Option<String>,
    pub common_mangled_newversion: Option<String>,
    pub download: u8,
    pub download_version: Option<String>,
    pub origtars: Vec<String>,
    pub previous_download_available: bool,
    pub previous_newversion: Option<String>,
    pub previous_newfile_base: Option<String>,
    pub previous_sigfile_base: Option<String>,
    pub signature: i8,
    pub uscanlog: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LineOptions {
    pub mode: Option<String>,
    pub pasv: Option<bool>,
    pub compression: Option<String>,
    pub searchmode_plain: bool,
    pub pgpmode: Option<String>,
    pub gitmode_shallow: bool,
    pub gitexport_all: bool,
    pub pretty: Option<String>,
    pub date: Option<String>,
    pub decompress: bool,
    pub bare: bool,
    pub repack: bool,
    pub repacksuffix: Option<String>,
    pub component: Option<String>,
    pub ctype: Option<String>,
    pub unzipopt: Option<String>,
    pub hrefdecode: Option<String>,
    pub versionless: bool,
    pub uversionmangle: Vec<String>,
    pub dversionmangle: Vec<String>,
    pub oversionmangle: Vec<String>,
    pub dirversionmangle: Vec<String>,
    pub filenamemangle: Vec<String>,
    pub pagemangle: Vec<String>,
    pub downloadurlmangle: Vec<String>,
    pub pgpsigurlmangle: Vec<String>,
    pub line_type_hint: Option<String>,
}

impl LineOptions {
    /// Parses the comma-separated `opts="..."` prefix of a watch line.
    pub fn parse(text: &str) -> LineOptions {
        let mut opts = LineOptions::default();
        for item in split_options(text) {
            let (key, value) = match item.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim().to_string())),
                None => (item.trim(), None),
            };
            match key {
                "mode" => opts.mode = value,
                "pasv" | "active" => opts.pasv = Some(key == "pasv"),
                "compression" => opts.compression = value,
                "searchmode" => opts.searchmode_plain = value.as_deref() == Some("plain"),
                "pgpmode" => opts.pgpmode = value,
                "gitmode" => opts.gitmode_shallow = value.as_deref() == Some("shallow"),
                "gitexport" => opts.gitexport_all = value.as_deref() == Some("all"),
                "pretty" => opts.pretty = value,
                "date" => opts.date = value,
                "decompress" => opts.decompress = true,
                "bare" => opts.bare = true,
                "repack" => opts.repack = true,
                "repacksuffix" => opts.repacksuffix = value,
                "component" => opts.component = value,
                "ctype" => opts.ctype = value,
                "unzipopt" => opts.unzipopt = value,
                "hrefdecode" => opts.hrefdecode = value,
                "versionless" => opts.versionless = true,
                "uversionmangle" => opts.uversionmangle = mangle_list(value),
                "dversionmangle" => opts.dversionmangle = mangle_list(value),
                "oversionmangle" => opts.oversionmangle = mangle_list(value),
                "dirversionmangle" => opts.dirversionmangle = mangle_list(value),
                "filenamemangle" => opts.filenamemangle = mangle_list(value),
                "pagemangle" => opts.pagemangle = mangle_list(value),
                "downloadurlmangle" => opts.downloadurlmangle = mangle_list(value),
                "pgpsigurlmangle" => opts.pgpsigurlmangle = mangle_list(value),
                "versionmangle" => {
                    let rules = mangle_list(value);
                    opts.uversionmangle = rules.clone();
                    opts.dversionmangle = rules;
                }
                "group" | "checksum" => opts.line_type_hint = Some(key.to_string()),
                _ => log::warn!("[watchline] unrecognized option: {}", key),
            }
        }
        opts
    }
}

fn mangle_list(value: Option<String>) -> Vec<String> {
    match value {
        Some(v) => v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    }
}

fn split_options(text: &str) -> Vec<String> {
    // options are comma-separated, but a mangle rule's own separator may
    // itself be a comma; only split on commas outside of `s///`/`tr///`
    // delimiter runs started by `=`.
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' | '[' | '(' | '<' => depth += 1,
            '}' | ']' | ')' | '>' => depth -= 1,
            ',' if depth <= 0 => {
                out.push(text[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(text[start..].to_string());
    out
}

/// Picks the transport for a line: an explicit `mode=` option wins,
/// otherwise it is inferred from the base URL's scheme. `git-dumb` is an
/// alias for `git`.
fn infer_mode(options: &LineOptions, base: &str) -> Mode {
    match options.mode.as_deref() {
        Some("git") | Some("git-dumb") => return Mode::Git,
        Some("svn") => return Mode::Svn,
        Some("ftp") => return Mode::Ftp,
        Some("http") => return Mode::Http,
        _ => {}
    }
    if base.starts_with("ftp://") {
        Mode::Ftp
    } else if base.starts_with("svn://") || base.starts_with("svn+") {
        Mode::Svn
    } else if base.starts_with("git://") {
        Mode::Git
    } else {
        Mode::Http
    }
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub base: String,
    pub filepattern: Regex,
    pub site: String,
    pub basedir: String,
    pub lastversion: String,
    pub mangled_lastversion: String,
    pub mode: Mode,
}

pub struct WatchLine {
    pub line_no: usize,
    pub line_type: LineType,
    pub options: LineOptions,
    pub raw_base: String,
    pub raw_pattern: String,
    pub last_version: String,
    pub action: Option<String>,
    pub status: i32,
    pub shared: Rc<RefCell<SharedState>>,
    parsed: Option<ParseResult>,
    search_result: Option<SearchResult>,
    searcher: Option<Box<dyn Searcher>>,
    resolved_url: Option<String>,
    newfile_base: Option<String>,
    mangled_newversion: Option<String>,
    version_mode: Option<VersionMode>,
    pub downloaded_path: Option<PathBuf>,
    pub repacked_path: Option<PathBuf>,
    pub signature_path: Option<PathBuf>,
}

impl WatchLine {
    pub fn new(
        line_no: usize,
        line_type: LineType,
        options: LineOptions,
        base: &str,
        pattern: &str,
        last_version: &str,
        action: Option<String>,
        shared: Rc<RefCell<SharedState>>,
    ) -> WatchLine {
        WatchLine {
            line_no,
            line_type,
            options,
            raw_base: base.to_string(),
            raw_pattern: pattern.to_string(),
            last_version: last_version.to_string(),
            action,
            status: 0,
            shared,
            parsed: None,
            search_result: None,
            searcher: None,
            resolved_url: None,
            newfile_base: None,
            mangled_newversion: None,
            version_mode: None,
            downloaded_path: None,
            repacked_path: None,
            signature_path: None,
        }
    }

    fn fail(&mut self, kind: Kind, msg: &str) -> WatchError {
        self.status = 1;
        WatchError::at_line(kind, msg, self.line_no)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn version_mode(&self) -> Option<VersionMode> {
        self.version_mode
    }

    pub fn newversion(&self) -> Option<&str> {
        self.mangled_newversion.as_deref()
    }

    /// Stage 1: Parse.
    pub fn parse(&mut self) -> Result<(), WatchError> {
        let mode = infer_mode(&self.options, &self.raw_base);

        let filepattern = if mode == Mode::Http || mode == Mode::Ftp {
            let regex_pattern = translate_pattern(&self.raw_pattern);
            Regex::new(&regex_pattern).map_err(|e| self.fail(Kind::Parse, &format!("invalid pattern: {}", e)))?
        } else if self.options.versionless {
            Regex::new("^$").unwrap()
        } else {
            Regex::new(&self.raw_pattern).map_err(|e| self.fail(Kind::Parse, &format!("invalid tag pattern: {}", e)))?
        };

        let (site, basedir) = split_site(&self.raw_base);

        let mangled_lastversion = self
            .options
            .dversionmangle
            .iter()
            .fold(self.last_version.clone(), |v, r| mangle::apply(r, &v));

        self.parsed = Some(ParseResult {
            base: self.raw_base.clone(),
            filepattern: filepattern.clone(),
            site,
            basedir,
            lastversion: self.last_version.clone(),
            mangled_lastversion,
            mode,
        });

        self.searcher = Some(self.build_searcher(mode, filepattern));
        Ok(())
    }

    fn build_searcher(&self, mode: Mode, filepattern: Regex) -> Box<dyn Searcher> {
        match mode {
            Mode::Http => {
                let search_mode = if self.options.searchmode_plain { SearchMode::Plain } else { SearchMode::Html };
                let mut s = HttpSearcher::new(&self.raw_base, filepattern, search_mode);
                s.pagemangle = self.options.pagemangle.clone();
                s.downloadurlmangle = self.options.downloadurlmangle.clone();
                s.versionless = self.options.versionless;
                s.download_version = self.shared.borrow().download_version.clone();
                Box::new(s)
            }
            Mode::Ftp => {
                let mut s = FtpSearcher::new(&self.raw_base, filepattern);
                s.dirversionmangle = self.options.dirversionmangle.clone();
                s.downloadurlmangle = self.options.downloadurlmangle.clone();
                s.versionless = self.options.versionless;
                s.download_version = self.shared.borrow().download_version.clone();
                Box::new(s)
            }
            Mode::Git => {
                let mut s = GitSearcher::new(&self.raw_base, &self.raw_pattern);
                s.mode = if self.options.gitmode_shallow {
                    crate::search::git::GitMode::Shallow
                } else {
                    crate::search::git::GitMode::Full
                };
                s.pretty = self.options.pretty.clone();
                s.date_format = self.options.date.clone();
                s.versionless = self.options.versionless;
                if !self.options.versionless {
                    s.tag_pattern = Some(filepattern);
                }
                Box::new(s)
            }
            Mode::Svn => {
                let mut s = SvnSearcher::new(&self.raw_base);
                s.versionless = self.options.versionless;
                if !self.options.versionless {
                    s.pattern = Some(filepattern);
                }
                Box::new(s)
            }
        }
    }

    fn parsed(&self) -> Result<&ParseResult, WatchError> {
        self.parsed.as_ref().ok_or_else(|| WatchError::at_line(Kind::Parse, "line not parsed yet", self.line_no))
    }

    /// Stage 2: Search.
    pub fn search(&mut self) -> Result<(), WatchError> {
        if self.status != 0 {
            return Ok(());
        }
        let searcher = self.searcher.as_mut().ok_or_else(|| WatchError::at_line(Kind::Parse, "line not parsed yet", self.line_no))?;

        let result = match searcher.search() {
            Ok(r) => r,
            Err(e) => {
                self.status = 1;
                if e.kind() == Kind::Network {
                    log::warn!("{}", e);
                    return Ok(());
                }
                return Err(e);
            }
        };

        match result {
            None => {
                self.status = 1;
                Err(WatchError::at_line(Kind::MatchEmpty, "no matching upstream file found", self.line_no))
            }
            Some(r) => {
                self.search_result = Some(r);
                Ok(())
            }
        }
    }

    fn search_result(&self) -> Option<&SearchResult> {
        self.search_result.as_ref()
    }

    /// Stage 3: URL resolve. HTML-entity `&amp;` is rewritten to `&` before
    /// `downloadurlmangle` (already applied inside the searcher); here we
    /// just fix up entities and obtain the upstream URL.
    pub fn resolve_url(&mut self) -> Result<(), WatchError> {
        if self.status != 0 {
            return Ok(());
        }
        let result = self
            .search_result()
            .ok_or_else(|| WatchError::at_line(Kind::Parse, "no search result to resolve", self.line_no))?
            .clone();
        let searcher = self.searcher.as_ref().unwrap();
        let url = searcher.upstream_url(&result)?;
        self.resolved_url = Some(url.replace("&amp;", "&"));
        Ok(())
    }

    /// Stage 4: Base name. If `filenamemangle` is set, mangle the URL (or
    /// href, for `versionless` lines) and keep only the basename; otherwise
    /// take the basename of the resolved URL stripped of `?...`/`#...`.
    pub fn derive_base_name(&mut self) -> Result<(), WatchError> {
        if self.status != 0 {
            return Ok(());
        }
        let url = self.resolved_url.clone().ok_or_else(|| {
            WatchError::at_line(Kind::Parse, "no resolved URL to name", self.line_no)
        })?;

        let name = if !self.options.filenamemangle.is_empty() {
            let mangled = self.options.filenamemangle.iter().fold(url.clone(), |v, r| mangle::apply(r, &v));
            basename(&mangled)
        } else {
            let stripped = url.split(['?', '#']).next().unwrap_or(&url);
            basename(stripped)
        };

        if name.is_empty() {
            return Err(self.fail(Kind::Parse, "could not derive a download file name"));
        }

        if self.options.versionless && self.options.filenamemangle.is_empty() {
            // Recover a version from the file name for downstream stages.
            let re = Regex::new(r"([0-9].*?)(\.tar\.(gz|bz2|xz|zst)|\.zip)$").unwrap();
            if let Some(cap) = re.captures(&name) {
                if let Some(result) = &mut self.search_result {
                    if result.newversion.is_empty() {
                        result.newversion = cap[1].to_string();
                    }
                }
            }
        }

        self.newfile_base = Some(name);
        Ok(())
    }

    /// Stage 5: apply uversionmangle to the discovered version, then
    /// compare against the (dversionmangle'd) last packaged version.
    pub fn mangle_new_version(&mut self) -> Option<String> {
        let raw = self.search_result()?.newversion.clone();
        let mangled = self.options.uversionmangle.iter().fold(raw, |v, r| mangle::apply(r, &v));
        self.mangled_newversion = Some(mangled.clone());
        Some(mangled)
    }

    pub fn compare_versions(&mut self, new_version: &str) -> Result<VersionMode, WatchError> {
        if self.status != 0 {
            return Ok(VersionMode::Ignore);
        }
        let parsed = self.parsed()?;
        let last = PackageVersion::parse_lenient(&parsed.mangled_lastversion);
        let new = PackageVersion::parse_lenient(new_version);

        let mode = match new.partial_cmp(&last) {
            Some(std::cmp::Ordering::Greater) => VersionMode::Newer,
            Some(std::cmp::Ordering::Equal) => VersionMode::Same,
            _ => VersionMode::Prev,
        };
        self.version_mode = Some(mode);
        if mode == VersionMode::Newer {
            let mut shared = self.shared.borrow_mut();
            shared.download = shared.download.max(1);
        }
        Ok(mode)
    }

    /// Stage 6: Download, honoring `shared.download` and pgpmode.
    pub fn download(
        &mut self,
        downloader: &mut Downloader,
        destdir: &Path,
        package: &str,
        already_downloaded: &mut HashSet<String>,
        keyring: Option<&Keyring>,
    ) -> Result<(), WatchError> {
        if self.status != 0 {
            return Ok(());
        }
        let download_mode = self.shared.borrow().download;
        if download_mode == 0 {
            return Ok(());
        }
        if self.version_mode != Some(VersionMode::Newer) && download_mode == 1 {
            return Ok(());
        }

        let pgpmode = PgpMode::from_option(self.options.pgpmode.as_deref());
        if pgpmode == PgpMode::Previous {
            // This line's artifact is a signature for the previous tarball
            // line; it consumes that line's download rather than producing
            // its own.
            let mut shared = self.shared.borrow_mut();
            shared.previous_sigfile_base = self.newfile_base.clone();
            return Ok(());
        }

        let newfile_base = self
            .newfile_base
            .clone()
            .ok_or_else(|| WatchError::at_line(Kind::Parse, "no file name to download to", self.line_no))?;

        if !already_downloaded.insert(newfile_base.clone()) {
            return Err(self.fail(
                Kind::Filesystem,
                &format!("duplicate download target: {}", newfile_base),
            ));
        }

        let dest = destdir.join(&newfile_base);
        let url = self.resolved_url.clone().unwrap_or_default();
        let version = self.mangled_newversion.clone().unwrap_or_default();

        let parsed_mode = self.parsed()?.mode;
        let protocol = match parsed_mode {
            Mode::Http => Protocol::Http,
            Mode::Ftp => Protocol::Ftp,
            Mode::Git => Protocol::Git,
            Mode::Svn => Protocol::Svn,
        };
        let want_state = if self.options.gitmode_shallow { GitRepoState::Shallow } else { GitRepoState::Full };
        let git_refspec = self
            .search_result()
            .map(|r| r.newfile.clone())
            .unwrap_or_else(|| self.raw_pattern.clone());

        downloader
            .download(
                protocol,
                &url,
                &dest,
                package,
                &version,
                want_state,
                &git_refspec,
                self.options.compression.as_deref(),
                self.options.gitexport_all,
            )
            .map_err(|e| {
                self.status = 1;
                e
            })?;

        self.downloaded_path = Some(dest.clone());

        match pgpmode {
            PgpMode::SelfSigned => {
                if let Some(k) = keyring {
                    let extracted = dest.with_extension("");
                    k.verify_self(&dest, &extracted).map_err(|e| {
                        self.status = 1;
                        e
                    })?;
                    self.downloaded_path = Some(extracted);
                }
            }
            PgpMode::GitTag => {
                if let Some(k) = keyring {
                    if let Some(repo_dir) = downloader.git_repo_dir() {
                        let tag = self.search_result().map(|r| r.newfile.clone()).unwrap_or_default();
                        k.verify_git_tag(repo_dir, &tag).map_err(|e| {
                            self.status = 1;
                            e
                        })?;
                    }
                }
            }
            PgpMode::Mangle => {
                if let Some(k) = keyring {
                    if let Some(sig_url) = self.signature_url(&url) {
                        self.fetch_and_verify_signature(downloader, k, &sig_url, &dest, destdir, &newfile_base, package, &version, want_state)?;
                    }
                }
            }
            PgpMode::Auto | PgpMode::Default => {
                if let Some(sig_url) = self.probe_signature_sibling(&url) {
                    if pgpmode == PgpMode::Default {
                        log::warn!(
                            "[watchline] signature {} found but pgpmode=default does not verify it",
                            sig_url
                        );
                    } else if let Some(k) = keyring {
                        self.fetch_and_verify_signature(downloader, k, &sig_url, &dest, destdir, &newfile_base, package, &version, want_state)?;
                    }
                }
            }
            _ => {}
        }

        {
            let mut shared = self.shared.borrow_mut();
            shared.origtars.push(newfile_base.clone());
            shared.previous_download_available = true;
            shared.previous_newversion = self.mangled_newversion.clone();
            shared.previous_newfile_base = Some(newfile_base);
        }

        Ok(())
    }

    fn signature_url(&self, tarball_url: &str) -> Option<String> {
        if self.options.pgpsigurlmangle.is_empty() {
            return None;
        }
        Some(self.options.pgpsigurlmangle.iter().fold(tarball_url.to_string(), |v, r| mangle::apply(r, &v)))
    }

    /// `pgpmode=auto|default`: probe the conventional detached-signature
    /// suffixes as siblings of the tarball URL.
    fn probe_signature_sibling(&self, tarball_url: &str) -> Option<String> {
        let mut fetcher = crate::fetch::Fetcher::new();
        for ext in ["asc", "gpg", "pgp", "sig", "sign"] {
            let candidate = format!("{}.{}", tarball_url, ext);
            if let Ok(response) = fetcher.get(&candidate) {
                if response.status == 200 {
                    return Some(candidate);
                }
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn fetch_and_verify_signature(
        &mut self,
        downloader: &mut Downloader,
        keyring: &Keyring,
        sig_url: &str,
        dest: &Path,
        destdir: &Path,
        newfile_base: &str,
        package: &str,
        version: &str,
        want_state: GitRepoState,
    ) -> Result<(), WatchError> {
        let sig_dest = destdir.join(format!("{}.asc", newfile_base));
        downloader.download(Protocol::Http, sig_url, &sig_dest, package, version, want_state, "", None, false)?;
        keyring.verify_detached(&sig_dest, dest).map_err(|e| {
            self.status = 1;
            e
        })?;
        self.signature_path = Some(sig_dest);
        Ok(())
    }

    /// Stage 7: Repack, delegating to the external `mk-origtargz`.
    pub fn repack(&mut self, package: &str, destdir: &Path) -> Result<(), WatchError> {
        if self.status != 0 {
            return Ok(());
        }
        let Some(downloaded) = self.downloaded_path.clone() else { return Ok(()) };
        let version = self.mangled_newversion.clone().unwrap_or_default();

        let req = RepackRequest {
            downloaded_file: &downloaded,
            package,
            version: &version,
            repack: self.options.repack,
            repacksuffix: self.options.repacksuffix.as_deref(),
            compression: self.options.compression.as_deref(),
            component: self.options.component.as_deref(),
            copyright_file: None,
            destdir,
            signature_file: self.signature_path.as_deref(),
            symlink_mode: None,
            force_repack: false,
            unzipopt: self.options.unzipopt.as_deref(),
        };

        let produced = repack::invoke(&req).map_err(|e| {
            self.status = 1;
            e
        })?;

        if let Some(mangled) = repack::mangled_version_from_path(&produced, package) {
            self.mangled_newversion = Some(mangled);
        }
        self.repacked_path = Some(produced);
        Ok(())
    }

    /// Stage 8: Clean. Protocol hook (git repo teardown happens inside the
    /// Downloader, not here; this releases the searcher's own resources).
    pub fn clean(&mut self) {
        if let Some(searcher) = self.searcher.as_mut() {
            let _ = searcher.clean();
        }
        self.search_result = None;
    }
}

/// Translates the watch-file's simplified glob-ish pattern syntax into a
/// `regex`-crate pattern: the grammar already uses Perl regex syntax for
/// capture groups, so this mostly anchors the match.
fn translate_pattern(pattern: &str) -> String {
    if pattern.starts_with('^') {
        pattern.to_string()
    } else {
        format!("^{}$", pattern)
    }
}

fn split_site(base: &str) -> (String, String) {
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);
    match base[scheme_end..].find('/') {
        Some(i) => {
            let site_end = scheme_end + i;
            (base[..site_end].to_string(), base[site_end..].to_string())
        }
        None => (base.to_string(), String::new()),
    }
}

fn basename(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_options() {
        let opts = LineOptions::parse("pasv,compression=xz,versionless");
        assert_eq!(opts.pasv, Some(true));
        assert_eq!(opts.compression.as_deref(), Some("xz"));
        assert!(opts.versionless);
    }

    #[test]
    fn parses_mangle_option_with_commas_inside_rule() {
        let opts = LineOptions::parse(r"uversionmangle=s/,/./;s/a/b/");
        assert_eq!(opts.uversionmangle.len(), 2);
    }

    #[test]
    fn split_site_separates_host_and_path() {
        let (site, basedir) = split_site("https://example.com/releases/");
        assert_eq!(site, "https://example.com");
        assert_eq!(basedir, "/releases/");
    }

    #[test]
    fn versionmangle_sets_both_shorthand_targets() {
        let opts = LineOptions::parse("versionmangle=s/-/./g");
        assert_eq!(opts.uversionmangle, opts.dversionmangle);
        assert_eq!(opts.uversionmangle.len(), 1);
    }

    #[test]
    fn infers_ftp_mode_from_scheme() {
        let opts = LineOptions::default();
        assert_eq!(infer_mode(&opts, "ftp://example.com/"), Mode::Ftp);
        assert_eq!(infer_mode(&opts, "https://example.com/"), Mode::Http);
    }

    #[test]
    fn explicit_mode_option_wins_over_scheme() {
        let opts = LineOptions::parse("mode=git");
        assert_eq!(infer_mode(&opts, "https://example.com/repo.git"), Mode::Git);
    }

    #[test]
    fn basename_strips_query_and_fragment() {
        assert_eq!(basename("https://example.com/dir/foo-1.0.tar.gz"), "foo-1.0.tar.gz");
    }
}
