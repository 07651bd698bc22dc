//! Finds package trees (directories containing `debian/watch`) under one
//! or more roots. Non-recursive below a matching tree: a package tree does
//! not nest another.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub tree: PathBuf,
    pub watch_file: PathBuf,
    pub changelog: PathBuf,
}

pub fn find_targets(roots: &[PathBuf]) -> Vec<ScanTarget> {
    let mut targets = Vec::new();
    for root in roots {
        walk(root, &mut targets);
    }
    targets
}

fn walk(dir: &Path, targets: &mut Vec<ScanTarget>) {
    let watch_file = dir.join("debian").join("watch");
    if watch_file.is_file() {
        targets.push(ScanTarget {
            tree: dir.to_path_buf(),
            watch_file,
            changelog: dir.join("debian").join("changelog"),
        });
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.file_name().map(|n| n != "debian").unwrap_or(true) {
            walk(&path, targets);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_package_tree() {
        let root = std::env::temp_dir().join(format!("watchscan-walker-{}", std::process::id()));
        let debian = root.join("pkg").join("debian");
        std::fs::create_dir_all(&debian).unwrap();
        std::fs::write(debian.join("watch"), "version=4\n").unwrap();

        let targets = find_targets(&[root.clone()]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].tree, root.join("pkg"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn does_not_descend_into_matched_tree() {
        let root = std::env::temp_dir().join(format!("watchscan-walker-nest-{}", std::process::id()));
        let debian = root.join("pkg").join("debian");
        std::fs::create_dir_all(&debian).unwrap();
        std::fs::write(debian.join("watch"), "version=4\n").unwrap();
        std::fs::create_dir_all(root.join("pkg").join("debian").join("nested-pkg").join("debian")).unwrap();

        let targets = find_targets(&[root.clone()]);
        assert_eq!(targets.len(), 1);

        std::fs::remove_dir_all(&root).ok();
    }
}
