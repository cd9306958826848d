//! Main build orchestration.
//!
//! This module provides the [`Builder`] that validates a configuration,
//! checks external tools, picks a build variant, runs it in a private work
//! directory and reports the produced image.

use super::{
    checksum::calculate_sha256,
    tool_detection::{ensure_tools, required_tools},
};
use crate::bundler::{
    BuiltImage, Result,
    error::ErrorExt,
    platform::macos::dmg::{
        Assembly, DiskImageTool, FinderAttributes, FinderLayoutWriter, Hdiutil, LayoutWriter,
        MacAttributes, Toolset,
    },
    settings::{BuildConfig, BuildVariant},
    utils::{ExecContext, ProgressSink},
};
use std::path::PathBuf;

/// Per-build runtime options.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Parent of the build's private work directory; the system temp
    /// directory when unset.
    ///
    /// Each build creates a uniquely named directory below this root and
    /// removes it when done. Callers running concurrent builds must not
    /// point them at a work directory another build is using.
    pub work_root: Option<PathBuf>,
    /// Cancellation and deadline for every external tool.
    pub context: ExecContext,
    /// Destination of progress lines.
    pub progress: ProgressSink,
}

/// Picks the variant for `config` unless it names one.
///
/// Hard links win, then compressed formats; everything else is standard.
pub fn select_variant(config: &BuildConfig) -> BuildVariant {
    if let Some(variant) = config.variant {
        return variant;
    }
    if config.use_hard_links {
        BuildVariant::HardLinkSafe
    } else if config.image_format().is_compressed() {
        BuildVariant::Compressed
    } else {
        BuildVariant::Standard
    }
}

/// Disk image build orchestrator.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_dmg::bundler::{BuildConfigBuilder, Builder, ItemKind};
///
/// # async fn example() -> kodegen_bundler_dmg::bundler::Result<()> {
/// let config = BuildConfigBuilder::new()
///     .title("MyApp")
///     .item(ItemKind::Dir, "build/MyApp.app", 149, 206)
///     .item(ItemKind::Link, "/Applications", 490, 206)
///     .build()?;
///
/// let image = Builder::new().build(config).await?;
/// println!("Created {} ({} bytes)", image.path.display(), image.size);
/// println!("SHA256: {}", image.checksum);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Builder<D = Hdiutil, A = MacAttributes, L = FinderLayoutWriter> {
    tools: Toolset<D, A, L>,
    options: BuildOptions,
    detect_tools: bool,
}

impl Builder {
    /// A builder driving the native macOS tools.
    pub fn new() -> Self {
        Self {
            tools: Toolset::default(),
            options: BuildOptions::default(),
            detect_tools: true,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, A, L> Builder<D, A, L>
where
    D: DiskImageTool,
    A: FinderAttributes,
    L: LayoutWriter,
{
    /// A builder driving custom collaborators. `PATH` lookup is skipped.
    pub fn with_toolset(tools: Toolset<D, A, L>) -> Self {
        Self {
            tools,
            options: BuildOptions::default(),
            detect_tools: false,
        }
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn toolset(&self) -> &Toolset<D, A, L> {
        &self.tools
    }

    /// Builds the image described by `config`.
    ///
    /// The work directory is removed on every path. On failure no output
    /// file is left behind unless one existed before the build.
    pub async fn build(&self, config: BuildConfig) -> Result<BuiltImage> {
        let config = config.normalized()?;
        if self.detect_tools {
            ensure_tools(&required_tools(&config))?;
        }
        let variant = select_variant(&config);
        let output = config.output_path();
        log::info!(
            "Building {} ({} variant, {})",
            output.display(),
            variant,
            config.image_format()
        );

        let work_dir = self.create_work_dir()?;
        let existed_before = output.exists();

        let mut assembly = Assembly::new(
            &self.tools,
            &config,
            work_dir.path(),
            &self.options.context,
            &self.options.progress,
        );
        if let Err(e) = assembly.run(variant).await {
            if !existed_before && output.exists() {
                if let Err(rm) = std::fs::remove_file(&output) {
                    log::warn!("Failed to remove partial {}: {}", output.display(), rm);
                }
            }
            return Err(e);
        }
        let warnings = std::mem::take(&mut assembly.warnings);
        drop(assembly);

        let size = tokio::fs::metadata(&output)
            .await
            .fs_context("reading image metadata", &output)?
            .len();
        let checksum = calculate_sha256(&output).await?;

        Ok(BuiltImage {
            path: output,
            variant,
            size,
            checksum,
            warnings,
        })
    }

    fn create_work_dir(&self) -> Result<tempfile::TempDir> {
        let root = self
            .options
            .work_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root).fs_context("creating work root", &root)?;
        tempfile::Builder::new()
            .prefix(&format!("kodegen-dmg-{}-", uuid::Uuid::new_v4().simple()))
            .tempdir_in(&root)
            .fs_context("creating work directory", &root)
    }
}
