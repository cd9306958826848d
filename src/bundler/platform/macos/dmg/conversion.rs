//! Format conversion and intermediate image files.
//!
//! Customization needs a read-write (UDRW) image; distribution wants a
//! compressed or read-only one. Changes made to a mounted read-only image
//! go to a shadow file and are discarded on detach, so the workflow is
//! always: create UDRW, customize, detach, convert.

use super::hdiutil::{ConvertRequest, DiskImageTool};
use crate::bundler::{
    error::{ErrorExt, Result},
    settings::{CompressionLevel, ImageFormat},
    utils::{
        ExecContext,
        fs::{remove_file_if_exists, sibling_with_prefix},
    },
};
use std::path::{Path, PathBuf};

/// An intermediate image next to the output, removed when dropped.
#[derive(Debug)]
pub struct TempImage {
    path: PathBuf,
}

impl TempImage {
    /// Reserves `temp_<unique>_<name>` beside `output`. Nothing is created.
    pub fn beside(output: &Path) -> Self {
        let prefix = format!("temp_{}_", uuid::Uuid::new_v4().simple());
        Self {
            path: sibling_with_prefix(output, &prefix),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        if let Err(e) = remove_file_if_exists(&self.path) {
            log::warn!(
                "Failed to remove intermediate image {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// The level actually passed to `hdiutil`; only zlib images take one.
pub fn effective_level(
    format: ImageFormat,
    level: Option<CompressionLevel>,
) -> Option<CompressionLevel> {
    (format == ImageFormat::Udzo).then(|| level.unwrap_or_default())
}

/// Converts `source` into `output` in `format`.
pub async fn convert_image<D: DiskImageTool>(
    tool: &D,
    ctx: &ExecContext,
    source: &Path,
    output: &Path,
    format: ImageFormat,
    level: Option<CompressionLevel>,
) -> Result<()> {
    tool.convert(
        &ConvertRequest {
            source,
            format,
            output,
            level: effective_level(format, level),
        },
        ctx,
    )
    .await
}

/// Replaces the writable image at `image` with a read-only (UDRO) copy.
pub async fn convert_to_read_only<D: DiskImageTool>(
    tool: &D,
    ctx: &ExecContext,
    image: &Path,
) -> Result<()> {
    let writable = TempImage::beside(image);
    tokio::fs::rename(image, writable.path())
        .await
        .fs_context("renaming image", image)?;
    convert_image(tool, ctx, writable.path(), image, ImageFormat::Udro, None).await?;
    log::info!("Converted {} to read-only", image.display());
    Ok(())
}
