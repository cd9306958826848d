//! macOS disk image builder.
//!
//! Turns a [`BuildConfig`] (content items, icon, background, window layout,
//! target format) into a distributable `.dmg`.
//!
//! # Overview
//!
//! A build:
//! 1. Validates and normalizes the configuration
//! 2. Checks the external tools it will invoke
//! 3. Stages content with the selected [`StagingStrategy`]
//! 4. Estimates capacity and creates the image
//! 5. Customizes the volume (icon, background, Finder layout)
//! 6. Converts to the final format and applies the file icon
//! 7. Returns a [`BuiltImage`] report
//!
//! Every temporary directory, mount point and intermediate image is
//! released on success, failure and cancellation alike.

pub mod builder;
pub mod error;
pub mod platform;
pub mod settings;
pub mod utils;

pub use builder::{BuildOptions, Builder, select_variant};
pub use error::{Context, Error, ErrorCategory, ErrorExt, Result};
pub use platform::macos::dmg::{
    DiskImageTool, FinderAttributes, FinderLayoutWriter, Hdiutil, LayoutWriter, MacAttributes,
    MountedVolume, Toolset, VolumeLayout,
};
pub use settings::{
    BuildConfig, BuildConfigBuilder, BuildVariant, CompressionLevel, ContentItem, ImageFormat,
    ItemKind, StagingStrategy,
};
pub use utils::{ExecContext, ProgressSink};

use std::path::PathBuf;

/// A finished disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// Absolute path of the image.
    pub path: PathBuf,
    /// Variant that produced it.
    pub variant: BuildVariant,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the image file, hex encoded.
    pub checksum: String,
    /// Cosmetic steps that degraded without failing the build.
    pub warnings: Vec<String>,
}
