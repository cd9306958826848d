//! Disk image capacity estimation.
//!
//! The container format needs its capacity declared up front. Under-sizing
//! fails the write, over-sizing only costs slack that the final compression
//! removes, so both policies round up.

use crate::bundler::{
    error::Result,
    settings::{ContentItem, ItemKind},
    utils::fs::tree_size,
};
use std::path::Path;

const MIB: u64 = 1024 * 1024;

/// Overhead added on top of the measured content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginPolicy {
    /// +50%, at least 200 MB, at most 2000 MB.
    Conservative,
    /// +20%, at least 100 MB.
    Lean,
}

impl MarginPolicy {
    fn overhead_percent(self) -> u64 {
        match self {
            Self::Conservative => 50,
            Self::Lean => 20,
        }
    }

    fn floor_mb(self) -> u64 {
        match self {
            Self::Conservative => 200,
            Self::Lean => 100,
        }
    }

    fn ceiling_mb(self) -> Option<u64> {
        match self {
            Self::Conservative => Some(2000),
            Self::Lean => None,
        }
    }

    /// Image capacity in MB for `bytes` of content.
    pub fn estimate_mb(self, bytes: u64) -> u64 {
        let content_mb = bytes.div_ceil(MIB);
        let padded = (content_mb * (100 + self.overhead_percent())).div_ceil(100);
        let floored = padded.max(self.floor_mb());
        match self.ceiling_mb() {
            Some(ceiling) => floored.min(ceiling),
            None => floored,
        }
    }
}

/// Capacity for an already staged tree.
pub fn estimate_tree(root: &Path, policy: MarginPolicy) -> Result<u64> {
    let bytes = tree_size([root])?;
    let size = policy.estimate_mb(bytes);
    log::debug!(
        "{} bytes staged under {}, image size {}MB",
        bytes,
        root.display(),
        size
    );
    Ok(size)
}

/// Capacity measured from the original, unstaged content.
///
/// Link items are skipped; their targets are not copied into the image.
pub fn estimate_items(items: &[ContentItem], policy: MarginPolicy) -> Result<u64> {
    let bytes = tree_size(
        items
            .iter()
            .filter(|item| item.kind != ItemKind::Link)
            .map(|item| item.path.as_path()),
    )?;
    Ok(policy.estimate_mb(bytes))
}

/// Capacity for a symlink-staged tree.
///
/// The image dereferences staged links when it is written, so the content
/// is measured at its source along with the copied background.
pub fn estimate_dereferenced(
    items: &[ContentItem],
    background: Option<&Path>,
    policy: MarginPolicy,
) -> Result<u64> {
    let bytes = tree_size(
        items
            .iter()
            .filter(|item| item.kind != ItemKind::Link)
            .map(|item| item.path.as_path())
            .chain(background),
    )?;
    Ok(policy.estimate_mb(bytes))
}
