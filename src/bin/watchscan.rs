use clap::Parser;
use watchscan::changelog::read_changelog;
use watchscan::config::{CliArgs, Config};
use watchscan::dehs::{render, Component};
use watchscan::logger::{init_logger, Verbosity};
use watchscan::verify::Keyring;
use watchscan::walker::find_targets;
use watchscan::watchfile::WatchFile;

/// CLI tool watchscan
///
/// Scans `debian/watch` files under one or more directories and reports
/// whether a newer upstream release is available.
fn main() {
    let args = CliArgs::parse();

    let verbosity = Verbosity::from_flags(args.verbose, args.debug, args.extra_debug, args.no_verbose);
    init_logger(verbosity);

    let config = Config::load(args);

    let targets = find_targets(&config.roots);
    if targets.is_empty() {
        log::warn!("[watchscan] no debian/watch files found under {:?}", config.roots);
    }

    let mut components = Vec::new();
    let mut overall_status = 0;

    for target in &targets {
        let changelog = match read_changelog(&target.changelog) {
            Ok(c) => c,
            Err(e) => {
                log::error!("[watchscan] {}: {}", target.tree.display(), e);
                overall_status = overall_status.max(1);
                let mut component = Component::new("unknown");
                component.errors.push(e.to_string());
                component.status = Some("error".to_string());
                components.push(component);
                continue;
            }
        };

        let mut watchfile = match WatchFile::parse(&target.watch_file, &changelog) {
            Ok(wf) => wf,
            Err(e) => {
                log::error!("[watchscan] {}: {}", target.watch_file.display(), e);
                overall_status = overall_status.max(1);
                let mut component = Component::new(&changelog.source_name);
                component.debian_uversion = Some(changelog.upstream_version.clone());
                component.errors.push(e.to_string());
                component.status = Some("error".to_string());
                components.push(component);
                continue;
            }
        };

        let destdir = target.tree.join(&config.destdir);
        if let Err(e) = std::fs::create_dir_all(&destdir) {
            log::error!("[watchscan] {}: could not create destdir: {}", destdir.display(), e);
            overall_status = overall_status.max(1);
            continue;
        }

        watchfile.downloader_mut().set_passive_ftp(config.pasv);

        let keyring = if config.skip_signature {
            None
        } else {
            let keyring_path = target.tree.join("debian").join("upstream").join("signing-key.asc");
            if keyring_path.is_file() {
                match Keyring::load(&keyring_path) {
                    Ok(k) => Some(k),
                    Err(e) => {
                        log::warn!("[watchscan] {}: {}", keyring_path.display(), e);
                        None
                    }
                }
            } else {
                None
            }
        };

        let (status, outcomes) = watchfile.process_lines(
            &changelog.source_name,
            &destdir,
            config.download_version.as_deref(),
            keyring.as_ref(),
        );
        overall_status = overall_status.max(status);

        if outcomes.is_empty() {
            let mut component = Component::new(&changelog.source_name);
            component.debian_uversion = Some(changelog.upstream_version.clone());
            component.status = Some("error".to_string());
            component.errors.push("no watch lines produced a result".to_string());
            components.push(component);
            continue;
        }

        for outcome in outcomes {
            let mut component = Component::new(&changelog.source_name);
            component.debian_uversion = Some(changelog.upstream_version.clone());
            component.upstream_version = outcome.upstream_version;
            component.upstream_url = outcome.upstream_url;
            component.decoded_checksum = outcome.decoded_checksum;
            component.target = outcome.target_path.as_ref().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned());
            component.target_path = outcome.target_path.map(|p| p.display().to_string());
            component.status = Some(outcome.status);
            components.push(component);
        }
    }

    if config.dehs {
        println!("{}", render(&components, &[]));
    }

    std::process::exit(overall_status);
}
