//! Helpers shared by the integration tests.

use dupsort::duplicates::{DuplicateFinder, FinderConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write `content` to `root/name`, creating parent directories.
pub fn write_file(root: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// A finder whose work files go to `work`.
pub fn finder(work: &TempDir) -> DuplicateFinder {
    DuplicateFinder::new(config(work))
}

/// Default configuration with work files under `work`.
pub fn config(work: &TempDir) -> FinderConfig {
    FinderConfig::default().with_work_dir(Some(work.path().to_path_buf()))
}

/// Run the pipeline and return the raw report.
pub fn report(finder: &DuplicateFinder, roots: &[PathBuf]) -> Vec<u8> {
    let mut out = Vec::new();
    finder.run(roots, &mut out).unwrap();
    out
}

/// File names (last component) of every path in a group, sorted.
pub fn names(paths: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
