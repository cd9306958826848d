//! Content staging: materializes every content item under a working root.
//!
//! Four strategies trade staging I/O against isolation from the source
//! tree (see [`StagingStrategy`]). Whatever the strategy, the background
//! image is always a real copy because the layout metadata refers to it by
//! its path inside the volume.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    settings::{ContentItem, ItemKind, StagingStrategy},
    utils::fs::{copy_file, copy_tree, hard_link_or_copy, link_tree, symlink},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Hidden folder holding the background image at the volume root.
pub const BACKGROUND_DIR: &str = ".background";

/// Names never copied out of bundles: Finder sidecars, resource-fork
/// archives, trash and Spotlight indices, transient files.
const EXCLUDED_NAMES: &[&str] = &[
    ".DS_Store",
    "__MACOSX",
    ".Trashes",
    ".fseventsd",
    ".Spotlight-V100",
    ".TemporaryItems",
    "*.tmp",
    "*.log",
    "*.cache",
];

static EXCLUDED_PATTERNS: LazyLock<Vec<glob::Pattern>> = LazyLock::new(|| {
    EXCLUDED_NAMES
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect()
});

/// True for entries the bundle-aware copy leaves out.
pub fn is_excluded(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    EXCLUDED_PATTERNS.iter().any(|p| p.matches(&name))
}

/// File name of the staged background, keeping the source extension.
pub fn background_file_name(source: &Path) -> String {
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "png".to_string());
    format!("background.{ext}")
}

/// Copies the background into `root/.background/`, returning its new path.
pub fn place_background(source: &Path, root: &Path) -> Result<PathBuf> {
    let dest = root
        .join(BACKGROUND_DIR)
        .join(background_file_name(source));
    copy_file(source, &dest).context("failed to copy background")?;
    Ok(dest)
}

/// What ended up in the staging root.
#[derive(Debug, Clone)]
pub struct StagedContent {
    pub root: PathBuf,
    /// One path per content item, in configuration order.
    pub entries: Vec<PathBuf>,
    /// Staged background image, when one was configured.
    pub background: Option<PathBuf>,
}

/// Stages `items` (and the optional background) under `root`.
///
/// Every source is checked before anything is written, so a missing path
/// fails the build before any copy or external tool runs.
pub fn stage_items(
    items: &[ContentItem],
    background: Option<&Path>,
    strategy: StagingStrategy,
    root: &Path,
) -> Result<StagedContent> {
    verify_sources(items, background)?;
    std::fs::create_dir_all(root).fs_context("creating staging directory", root)?;

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let dest = root.join(item.name()?);
        stage_item(item, strategy, &dest)?;
        entries.push(dest);
    }

    let background = background
        .map(|source| place_background(source, root))
        .transpose()?;

    log::debug!(
        "Staged {} items into {} using {}",
        entries.len(),
        root.display(),
        strategy
    );

    Ok(StagedContent {
        root: root.to_path_buf(),
        entries,
        background,
    })
}

/// Async entry point; the copy work runs on the blocking pool.
pub async fn stage(
    items: Vec<ContentItem>,
    background: Option<PathBuf>,
    strategy: StagingStrategy,
    root: PathBuf,
) -> Result<StagedContent> {
    tokio::task::spawn_blocking(move || {
        stage_items(&items, background.as_deref(), strategy, &root)
    })
    .await
    .map_err(|e| Error::GenericError(format!("staging task panicked: {}", e)))?
}

/// Checks that every non-link source and the background exist.
pub fn verify_sources(items: &[ContentItem], background: Option<&Path>) -> Result<()> {
    for item in items.iter().filter(|item| item.kind != ItemKind::Link) {
        if item.path.symlink_metadata().is_err() {
            return Err(Error::MissingSource(item.path.clone()));
        }
    }
    if let Some(background) = background {
        if !background.is_file() {
            return Err(Error::MissingSource(background.to_path_buf()));
        }
    }
    Ok(())
}

fn stage_item(item: &ContentItem, strategy: StagingStrategy, dest: &Path) -> Result<()> {
    use StagingStrategy::*;

    match (item.kind, strategy) {
        (ItemKind::Link, _) | (_, Symlink) => {
            symlink(&item.path, dest).fs_context("creating symbolic link", dest)?;
        }
        (ItemKind::File, Copy) => copy_file(&item.path, dest)?,
        (ItemKind::File, HardLink | SafeHardLink) => {
            hard_link_or_copy(&item.path, dest)?;
        }
        (ItemKind::Dir, Copy) if item.is_app_bundle() => {
            copy_tree(&item.path, dest, &is_excluded)?;
        }
        (ItemKind::Dir, Copy) => {
            copy_tree(&item.path, dest, &|_| false)?;
        }
        (ItemKind::Dir, HardLink) => {
            let stats = link_tree(&item.path, dest)?;
            log::debug!(
                "{}: {} files hard linked, {} copied",
                item.path.display(),
                stats.linked,
                stats.copied
            );
        }
        (ItemKind::Dir, SafeHardLink) => {
            copy_tree(&item.path, dest, &is_excluded)?;
        }
    }
    Ok(())
}
