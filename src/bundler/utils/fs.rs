//! File system utilities for staging disk image content.
//!
//! Provides tree copies that preserve symlinks, hard-link trees with a
//! per-file copy fallback, and idempotent removal helpers. The tree walkers
//! are synchronous; async callers run them inside `spawn_blocking`.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

/// One way of materializing `to` from `from`.
pub type Materialize = fn(&Path, &Path) -> io::Result<()>;

/// Tries each attempt in order; the first success wins.
///
/// Returns the label of the attempt that succeeded. When every attempt
/// fails, the last failure is reported against `from`.
pub fn first_success(
    from: &Path,
    to: &Path,
    attempts: &[(&'static str, Materialize)],
) -> Result<&'static str> {
    let mut last = None;
    for (label, attempt) in attempts {
        match attempt(from, to) {
            Ok(()) => return Ok(*label),
            Err(error) => {
                log::debug!("{} {} failed: {}", label, from.display(), error);
                last = Some((*label, error));
            }
        }
    }
    match last {
        Some((context, error)) => Err(Error::Fs {
            context,
            path: from.to_path_buf(),
            error,
        }),
        None => Err(Error::GenericError(format!(
            "no way to materialize {}",
            from.display()
        ))),
    }
}

/// Hard link attempt for [`first_success`].
pub fn hard_link(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::hard_link(from, to)
}

/// Byte copy attempt for [`first_success`].
pub fn copy_bytes(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}

/// Hard links a file, falling back to a copy.
pub fn hard_link_or_copy(from: &Path, to: &Path) -> Result<&'static str> {
    first_success(
        from,
        to,
        &[("hard linking", hard_link), ("copying", copy_bytes)],
    )
}

/// Makes a symbolic link at `link` pointing to `target`.
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Copies a regular file, creating parent directories of the destination.
///
/// Fails if the source path is a directory or doesn't exist.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::MissingSource(from.to_path_buf()));
    }
    if !from.is_file() {
        return Err(Error::GenericError(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        std::fs::create_dir_all(dest_dir).fs_context("creating directory", dest_dir)?;
    }
    std::fs::copy(from, to).fs_context("copying file", from)?;
    Ok(())
}

/// Recursively copies `from` to `to`, skipping entries `exclude` matches.
///
/// Symlinks are recreated, not followed, so framework `Versions/Current`
/// links inside bundles survive intact. Excluded directories are pruned
/// with their whole subtree.
pub fn copy_tree(from: &Path, to: &Path, exclude: &dyn Fn(&OsStr) -> bool) -> Result<usize> {
    if !from.is_dir() {
        return Err(Error::MissingSource(from.to_path_buf()));
    }
    let mut files = 0;
    let walker = walkdir::WalkDir::new(from)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !exclude(e.file_name()));
    for entry in walker {
        let entry = entry?;
        let dest = to.join(entry.path().strip_prefix(from)?);
        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading link", entry.path())?;
            symlink(&target, &dest).fs_context("creating symlink", &dest)?;
        } else if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).fs_context("creating directory", &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest).fs_context("copying file", entry.path())?;
            files += 1;
        }
    }
    Ok(files)
}

/// Counts of how leaf files were materialized by [`link_tree`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub linked: usize,
    pub copied: usize,
}

/// Recreates the directory structure of `from` under `to`, hard linking
/// every leaf file and copying the ones that cannot be linked.
pub fn link_tree(from: &Path, to: &Path) -> Result<LinkStats> {
    if !from.is_dir() {
        return Err(Error::MissingSource(from.to_path_buf()));
    }
    let mut stats = LinkStats::default();
    for entry in walkdir::WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let dest = to.join(entry.path().strip_prefix(from)?);
        if entry.file_type().is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading link", entry.path())?;
            symlink(&target, &dest).fs_context("creating symlink", &dest)?;
        } else if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).fs_context("creating directory", &dest)?;
        } else if hard_link_or_copy(entry.path(), &dest)? == "hard linking" {
            stats.linked += 1;
        } else {
            stats.copied += 1;
        }
    }
    Ok(stats)
}

/// Sum of the sizes of every non-directory entry under `paths`.
///
/// Symlinks are not followed; they count as their own size.
pub fn tree_size<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<u64> {
    let mut total = 0u64;
    for path in paths {
        for entry in walkdir::WalkDir::new(path).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}

/// Removes a file, treating an already-missing file as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Returns the path next to `path` with `prefix` prepended to its file name.
pub fn sibling_with_prefix(path: &Path, prefix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}{name}"))
}
