//! Layered configuration: built-in defaults, devscripts-style config files,
//! environment variables, then CLI flags, each overriding the last.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "watchscan", about = "Scan debian/watch files for new upstream releases")]
pub struct CliArgs {
    /// Directories to scan (default: current directory).
    pub roots: Vec<PathBuf>,

    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long)]
    pub debug: bool,

    #[arg(long = "extra-debug")]
    pub extra_debug: bool,

    #[arg(long = "no-verbose")]
    pub no_verbose: bool,

    /// 0 = never, 1 = only if newer, 2 = always if available, 3 = force.
    #[arg(long, value_name = "N")]
    pub download: Option<u8>,

    #[arg(long = "no-download")]
    pub no_download: bool,

    #[arg(long = "skip-signature")]
    pub skip_signature: bool,

    #[arg(long = "download-version")]
    pub download_version: Option<String>,

    #[arg(long)]
    pub dehs: bool,

    #[arg(long)]
    pub destdir: Option<PathBuf>,

    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long = "user-agent")]
    pub user_agent: Option<String>,

    #[arg(long)]
    pub pasv: bool,

    #[arg(long = "no-pasv")]
    pub no_pasv: bool,

    #[arg(long = "check-dirname-level")]
    pub check_dirname_level: Option<u8>,

    #[arg(long = "check-dirname-regex")]
    pub check_dirname_regex: Option<String>,

    #[arg(long = "no-symlink")]
    pub no_symlink: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub download: u8,
    pub skip_signature: bool,
    pub download_version: Option<String>,
    pub dehs: bool,
    pub destdir: PathBuf,
    pub timeout: u64,
    pub user_agent: String,
    pub pasv: Option<bool>,
    pub check_dirname_level: u8,
    pub check_dirname_regex: String,
    pub no_symlink: bool,
    pub roots: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            download: 1,
            skip_signature: false,
            download_version: None,
            dehs: false,
            destdir: PathBuf::from(".."),
            timeout: 20,
            user_agent: "Debian uscan (watchscan)".to_string(),
            pasv: None,
            check_dirname_level: 1,
            check_dirname_regex: r"PACKAGE(-|_)VERSION".to_string(),
            no_symlink: false,
            roots: vec![PathBuf::from(".")],
        }
    }
}

impl Config {
    /// `Defaults < ConfigFile < Environment < CliArgs`.
    pub fn load(args: CliArgs) -> Config {
        let mut config = Config::default();

        for path in devscripts_config_paths() {
            if let Ok(content) = std::fs::read_to_string(&path) {
                apply_file(&mut config, &content);
            }
        }

        apply_env(&mut config);
        apply_cli(&mut config, args);
        config
    }
}

fn devscripts_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/devscripts.conf")];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".devscripts"));
    }
    paths
}

fn parse_shell_vars(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    vars
}

fn apply_file(config: &mut Config, content: &str) {
    let vars = parse_shell_vars(content);
    if let Some(v) = vars.get("USCAN_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.timeout = v;
    }
    if let Some(v) = vars.get("USCAN_DESTDIR") {
        config.destdir = PathBuf::from(v);
    }
    if let Some(v) = vars.get("USCAN_USER_AGENT") {
        config.user_agent = v.clone();
    }
    if let Some(v) = vars.get("USCAN_PASV") {
        config.pasv = Some(is_yes(v));
    }
    if let Some(v) = vars.get("USCAN_EXCLUSION") {
        config.no_symlink = is_yes(v);
    }
}

fn apply_env(config: &mut Config) {
    if let Ok(v) = std::env::var("UPSTREAM_VERSION") {
        config.download_version = Some(v);
    }
    if let Ok(v) = std::env::var("FTP_PASSIVE") {
        config.pasv = Some(v == "1");
    }
}

fn apply_cli(config: &mut Config, args: CliArgs) {
    if !args.roots.is_empty() {
        config.roots = args.roots;
    }
    if let Some(d) = args.download {
        config.download = d;
    }
    if args.no_download {
        config.download = 0;
    }
    config.skip_signature = config.skip_signature || args.skip_signature;
    if args.download_version.is_some() {
        config.download_version = args.download_version;
    }
    config.dehs = config.dehs || args.dehs;
    if let Some(d) = args.destdir {
        config.destdir = d;
    }
    if let Some(t) = args.timeout {
        config.timeout = t;
    }
    if let Some(ua) = args.user_agent {
        config.user_agent = ua;
    }
    if args.pasv {
        config.pasv = Some(true);
    }
    if args.no_pasv {
        config.pasv = Some(false);
    }
    if let Some(l) = args.check_dirname_level {
        config.check_dirname_level = l;
    }
    if let Some(r) = args.check_dirname_regex {
        config.check_dirname_regex = r;
    }
    config.no_symlink = config.no_symlink || args.no_symlink;
}

fn is_yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes") || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_default_timeout() {
        let mut config = Config::default();
        apply_file(&mut config, "USCAN_TIMEOUT=45\n");
        assert_eq!(config.timeout, 45);
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        let mut config = Config::default();
        apply_file(&mut config, "USCAN_TIMEOUT=not-a-number\n");
        assert_eq!(config.timeout, 20);
    }

    #[test]
    fn shell_vars_skip_comments() {
        let vars = parse_shell_vars("# comment\nUSCAN_TIMEOUT=5\n");
        assert_eq!(vars.get("USCAN_TIMEOUT").unwrap(), "5");
    }
}
