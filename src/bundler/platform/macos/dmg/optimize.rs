//! Pre-staging cleanup of `.app` bundles.
//!
//! Removes files the system regenerates (signature resource cache, Finder
//! metadata) and transient files in the standard bundle subdirectories.
//! Nothing here is fatal: each failure becomes a warning.

use std::path::{Path, PathBuf};

/// Subdirectories of `Contents` scanned for `*.tmp` files.
const SCANNED_DIRS: &[&str] = &["MacOS", "Resources", "Frameworks"];

/// Strips regenerable files from `app`, returning one warning per failure.
pub fn optimize_app_bundle(app: &Path) -> Vec<String> {
    let mut warnings = Vec::new();
    let contents = app.join("Contents");

    let fixed = [
        contents.join("_CodeSignature").join("CodeResources"),
        app.join(".DS_Store"),
        contents.join(".DS_Store"),
    ];
    for path in fixed.iter().chain(transient_files(&contents).iter()) {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warnings.push(format!("failed to remove {}: {}", path.display(), e)),
        }
    }
    warnings
}

fn transient_files(contents: &Path) -> Vec<PathBuf> {
    SCANNED_DIRS
        .iter()
        .map(|dir| contents.join(dir).join("*.tmp"))
        .filter_map(|pattern| glob::glob(&pattern.to_string_lossy()).ok())
        .flat_map(|paths| paths.filter_map(|p| p.ok()))
        .collect()
}
