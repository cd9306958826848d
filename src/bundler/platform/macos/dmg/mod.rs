//! macOS DMG disk image assembly.
//!
//! Builds drag-to-install disk images with the native `hdiutil` tool.
//!
//! # Architecture
//!
//! - `hdiutil` - the create/attach/detach/convert primitive ([`DiskImageTool`])
//! - `staging` - materializes content items in a working directory
//! - `sizing` - capacity estimation
//! - `mount` - scoped attach with guaranteed detach
//! - `customization` - volume icon, background and layout
//! - `layout` - Finder layout metadata ([`LayoutWriter`])
//! - `icon` - Finder flags and file icons ([`FinderAttributes`])
//! - `conversion` - format conversion and intermediate images
//! - `optimize` - pre-staging bundle cleanup
//!
//! Every build variant ends up in one of two assembly paths: create the
//! image straight from a customized folder, or create a writable
//! intermediate, customize it while mounted and convert.

mod conversion;
mod customization;
mod hdiutil;
mod icon;
mod layout;
mod mount;
mod optimize;
mod sizing;
mod staging;

pub use conversion::{TempImage, convert_image, convert_to_read_only, effective_level};
pub use customization::VolumeCustomizer;
pub use hdiutil::{AttachedImage, ConvertRequest, CreateRequest, DiskImageTool, Hdiutil, parse_info_plist};
pub use icon::{FinderAttributes, MacAttributes, VOLUME_ICON_FILE, app_icon, prepare_icon};
pub use layout::{FinderLayoutWriter, LAYOUT_FILE, LayoutWriter, VolumeLayout};
pub use mount::{MountedVolume, force_detach_image, with_mounted};
pub use optimize::optimize_app_bundle;
pub use sizing::{MarginPolicy, estimate_dereferenced, estimate_items, estimate_tree};
pub use staging::{BACKGROUND_DIR, StagedContent, is_excluded, stage, stage_items, verify_sources};

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    settings::{BuildConfig, BuildVariant, CompressionLevel, ImageFormat, StagingStrategy},
    utils::{ExecContext, ProgressSink, fs::symlink},
};
use std::path::{Path, PathBuf};

/// The external collaborators a build drives.
#[derive(Debug, Clone, Default)]
pub struct Toolset<D, A, L> {
    pub disk: D,
    pub attributes: A,
    pub layout: L,
}

impl<D, A, L> Toolset<D, A, L> {
    pub fn new(disk: D, attributes: A, layout: L) -> Self {
        Self {
            disk,
            attributes,
            layout,
        }
    }
}

/// One build in progress.
///
/// `config` must be normalized and `work_dir` private to this build.
pub struct Assembly<'a, D, A, L> {
    pub tools: &'a Toolset<D, A, L>,
    pub config: &'a BuildConfig,
    pub work_dir: &'a Path,
    pub ctx: &'a ExecContext,
    pub progress: &'a ProgressSink,
    pub warnings: Vec<String>,
    volume_icon: Option<PathBuf>,
}

impl<'a, D, A, L> Assembly<'a, D, A, L>
where
    D: DiskImageTool,
    A: FinderAttributes,
    L: LayoutWriter,
{
    pub fn new(
        tools: &'a Toolset<D, A, L>,
        config: &'a BuildConfig,
        work_dir: &'a Path,
        ctx: &'a ExecContext,
        progress: &'a ProgressSink,
    ) -> Self {
        Self {
            tools,
            config,
            work_dir,
            ctx,
            progress,
            warnings: Vec::new(),
            volume_icon: None,
        }
    }

    /// Runs `variant` to completion, including the file icon step.
    pub async fn run(&mut self, variant: BuildVariant) -> Result<()> {
        verify_sources(&self.config.contents, self.config.background.as_deref())?;
        if let Some(parent) = self.output().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating output directory", parent)?;
        }
        self.volume_icon = self
            .config
            .icon
            .as_deref()
            .map(|icon| prepare_icon(icon, self.work_dir))
            .transpose()?;

        if self.config.optimize_app_size {
            self.optimize_bundles();
        }

        match variant {
            BuildVariant::Standard => self.standard().await?,
            BuildVariant::Compressed => self.compressed().await?,
            BuildVariant::ExactSize => self.exact_size().await?,
            BuildVariant::HardLinkSafe => self.hard_link_safe().await?,
        }

        self.apply_file_icon().await;
        self.progress.step(&format!(
            "DMG created successfully: {}",
            self.output().display()
        ));
        Ok(())
    }

    fn output(&self) -> PathBuf {
        self.config.output_path()
    }

    fn strategy_or(&self, default: StagingStrategy) -> StagingStrategy {
        self.config.strategy.unwrap_or(default)
    }

    fn optimize_bundles(&mut self) {
        let config = self.config;
        for app in config.contents.iter().filter(|i| i.is_app_bundle()) {
            self.progress
                .step(&format!("Optimizing {}", app.path.display()));
            for warning in optimize_app_bundle(&app.path) {
                self.warn(format!("failed to optimize app bundle: {warning}"));
            }
        }
    }

    fn warn(&mut self, message: String) {
        self.progress.warn(&message);
        self.warnings.push(message);
    }

    async fn stage_into(&self, root: PathBuf, strategy: StagingStrategy) -> Result<StagedContent> {
        self.progress.step(&format!(
            "Staging {} items ({})",
            self.config.contents.len(),
            strategy
        ));
        stage(
            self.config.contents.clone(),
            self.config.background.clone(),
            strategy,
            root,
        )
        .await
        .context("staging content")
    }

    /// Lean capacity for a staged tree. Symlinked entries are sized from
    /// their targets.
    fn staged_size(&self, staged: &StagedContent, strategy: StagingStrategy) -> Result<u64> {
        match strategy {
            StagingStrategy::Symlink => estimate_dereferenced(
                &self.config.contents,
                self.config.background.as_deref(),
                MarginPolicy::Lean,
            ),
            _ => estimate_tree(&staged.root, MarginPolicy::Lean),
        }
    }

    async fn customize(&mut self, root: &Path) -> Result<()> {
        let customizer = VolumeCustomizer::new(&self.tools.attributes, &self.tools.layout);
        let warnings = customizer
            .apply(root, self.config, self.volume_icon.as_deref(), self.ctx)
            .await?;
        for warning in warnings {
            self.warn(warning);
        }
        Ok(())
    }

    /// Stage, customize the staging folder, create in the target format.
    async fn standard(&mut self) -> Result<()> {
        let staged = self
            .stage_into(self.work_dir.join("staging"), self.strategy_or(StagingStrategy::Copy))
            .await?;
        self.customize(&staged.root).await?;

        let format = self.config.image_format();
        let output = self.output();
        self.progress
            .step(&format!("Creating {} image {}", format, output.display()));
        self.tools
            .disk
            .create(
                &CreateRequest {
                    title: &self.config.title,
                    source: &staged.root,
                    format,
                    output: &output,
                    size_mb: None,
                },
                self.ctx,
            )
            .await
            .context("creating image")?;

        if format == ImageFormat::Udrw {
            convert_to_read_only(&self.tools.disk, self.ctx, &output)
                .await
                .context("converting image to read-only")?;
        }
        Ok(())
    }

    /// Stage, then go through a customized writable intermediate.
    async fn compressed(&mut self) -> Result<()> {
        let strategy = self.strategy_or(StagingStrategy::Copy);
        let staged = self
            .stage_into(self.work_dir.join("staging"), strategy)
            .await?;
        let size = self.staged_size(&staged, strategy)?;
        self.assemble_via_intermediate(&staged.root, size, self.config.compression_level)
            .await
    }

    /// Size from the original content and build the image around the main
    /// application bundle.
    async fn exact_size(&mut self) -> Result<()> {
        let app = self.config.main_app().ok_or(Error::NoAppBundle)?.clone();
        let size = estimate_items(&self.config.contents, MarginPolicy::Conservative)?;
        self.progress
            .step(&format!("Creating DMG with size: {size}MB"));

        let intermediate = TempImage::beside(&self.output());
        self.progress.step(&format!(
            "Creating temporary DMG from {}",
            app.path.display()
        ));
        self.create_writable(&app.path, intermediate.path(), size)
            .await?;

        self.progress.step("Mounting and customizing DMG...");
        let extras: Vec<_> = self
            .config
            .contents
            .iter()
            .filter(|item| item.path != app.path)
            .cloned()
            .collect();
        let tools = self.tools;
        let config = self.config;
        let icon = self.volume_icon.clone();
        let ctx = self.ctx;
        let warnings = with_mounted(&tools.disk, ctx, intermediate.path(), async |volume: &MountedVolume| {
            let root = volume.mount_point().to_path_buf();
            stage(extras, None, StagingStrategy::Copy, root.clone()).await?;
            let applications = root.join("Applications");
            if applications.symlink_metadata().is_err() {
                symlink(Path::new("/Applications"), &applications)
                    .fs_context("creating Applications link", &applications)?;
            }
            VolumeCustomizer::new(&tools.attributes, &tools.layout)
                .apply(&root, config, icon.as_deref(), ctx)
                .await
        })
        .await
        .context("customizing mounted image")?;
        for warning in warnings {
            self.warn(warning);
        }

        let requested = self.config.image_format();
        if requested != ImageFormat::Udzo {
            self.warn(format!(
                "exact-size images are always UDZO, ignoring format {requested}"
            ));
        }
        let level = self.config.compression_level.or(Some(CompressionLevel::MAX));
        self.finish_intermediate(intermediate, ImageFormat::Udzo, level)
            .await
    }

    /// Safe hard-link staging in an isolated folder with lean sizing.
    async fn hard_link_safe(&mut self) -> Result<()> {
        let isolated = tempfile::Builder::new()
            .prefix("safe-")
            .tempdir_in(self.work_dir)
            .fs_context("creating isolated staging directory", self.work_dir)?;
        let strategy = self.strategy_or(StagingStrategy::SafeHardLink);
        let staged = self
            .stage_into(isolated.path().join("staging"), strategy)
            .await?;
        let size = self.staged_size(&staged, strategy)?;

        let format = self.config.image_format();
        if format.is_compressed() {
            return self
                .assemble_via_intermediate(&staged.root, size, self.config.compression_level)
                .await;
        }

        self.customize(&staged.root).await?;
        let output = self.output();
        self.progress
            .step(&format!("Creating DMG with size: {size}MB"));
        self.tools
            .disk
            .create(
                &CreateRequest {
                    title: &self.config.title,
                    source: &staged.root,
                    format,
                    output: &output,
                    size_mb: Some(size),
                },
                self.ctx,
            )
            .await
            .context("creating image")
    }

    /// Writable intermediate from `source`, customized while mounted, then
    /// converted to the target format.
    async fn assemble_via_intermediate(
        &mut self,
        source: &Path,
        size_mb: u64,
        level: Option<CompressionLevel>,
    ) -> Result<()> {
        let intermediate = TempImage::beside(&self.output());
        self.progress
            .step(&format!("Creating temporary DMG with size: {size_mb}MB"));
        self.create_writable(source, intermediate.path(), size_mb)
            .await?;

        self.progress.step("Mounting and customizing DMG...");
        let tools = self.tools;
        let config = self.config;
        let icon = self.volume_icon.clone();
        let ctx = self.ctx;
        let warnings = with_mounted(&tools.disk, ctx, intermediate.path(), async |volume: &MountedVolume| {
            VolumeCustomizer::new(&tools.attributes, &tools.layout)
                .apply(volume.mount_point(), config, icon.as_deref(), ctx)
                .await
        })
        .await
        .context("customizing mounted image")?;
        for warning in warnings {
            self.warn(warning);
        }

        let format = self.config.image_format();
        self.finish_intermediate(intermediate, format, level).await
    }

    async fn create_writable(&self, source: &Path, output: &Path, size_mb: u64) -> Result<()> {
        self.tools
            .disk
            .create(
                &CreateRequest {
                    title: &self.config.title,
                    source,
                    format: ImageFormat::Udrw,
                    output,
                    size_mb: Some(size_mb),
                },
                self.ctx,
            )
            .await
            .context("creating writable image")
    }

    /// Safety detach pass, then convert; the intermediate is removed on
    /// every path when `intermediate` drops.
    async fn finish_intermediate(
        &mut self,
        intermediate: TempImage,
        format: ImageFormat,
        level: Option<CompressionLevel>,
    ) -> Result<()> {
        let stray = force_detach_image(
            &self.tools.disk,
            intermediate.path(),
            &self.ctx.for_cleanup(),
        )
        .await;
        if stray > 0 {
            log::warn!(
                "{} was still attached at {} mount point(s)",
                intermediate.path().display(),
                stray
            );
        }

        self.progress
            .step(&format!("Converting to {format} format..."));
        convert_image(
            &self.tools.disk,
            self.ctx,
            intermediate.path(),
            &self.output(),
            format,
            level,
        )
        .await
        .context("converting image")
    }

    /// Cosmetic: failures become warnings.
    async fn apply_file_icon(&mut self) {
        let Some(icon) = self.config.file_icon_path() else {
            return;
        };
        let result = match prepare_icon(icon, self.work_dir) {
            Ok(icns) => {
                self.tools
                    .attributes
                    .embed_file_icon(&icns, &self.output(), self.work_dir, self.ctx)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.warn(format!("failed to set file icon: {e}"));
        }
    }
}
