//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap and the
//! translation of arguments into a [`BuildConfig`].

use crate::bundler::{
    BuildConfig, BuildVariant, CompressionLevel, ContentItem, ImageFormat, ItemKind,
    StagingStrategy, platform::macos::dmg::app_icon, settings::is_app_bundle_path,
};
use crate::error::{BundlerError, CliError, Result};
use crate::metadata::load_config;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

/// Create a .dmg for macOS application deployment
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_dmg",
    version,
    about = "Create a .dmg for macOS application deployment",
    long_about = "Creates a drag-to-install disk image from an .app bundle, with an
Applications link, optional volume icon, background image and Finder layout.

Usage:
  kodegen_bundler_dmg --app build/MyApp.app
  kodegen_bundler_dmg --app build/MyApp.app --bg assets/dmg-bg.png -o dist/MyApp.dmg
  kodegen_bundler_dmg --config dmg.json --timeout 600

With --config, the file describes the contents; --out, --title, --icon, --bg,
--variant, --strategy, --use-hard-links and --optimize-app-size override it.

Exit code 0 = image guaranteed to exist at the output path."
)]
pub struct Args {
    /// App bundle path (must end in .app)
    #[arg(long, value_name = "PATH", required_unless_present = "config", conflicts_with = "config")]
    pub app: Option<PathBuf>,

    /// The output DMG file name
    #[arg(short = 'o', long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// The title displayed when the DMG file is mounted
    #[arg(short = 't', long)]
    pub title: Option<String>,

    /// Path to the icon file to display in the DMG file (icns, png)
    #[arg(long, value_name = "PATH")]
    pub icon: Option<PathBuf>,

    /// Path to the background image file
    #[arg(long = "background", visible_alias = "bg", value_name = "PATH")]
    pub background: Option<PathBuf>,

    /// Width of the Finder window when the DMG file is opened
    #[arg(long = "window-width", visible_alias = "ww", default_value_t = 640)]
    pub window_width: u32,

    /// Height of the Finder window when the DMG file is opened
    #[arg(long = "window-height", visible_alias = "wh", default_value_t = 480)]
    pub window_height: u32,

    /// Size of the label text in the Finder window (10-16)
    #[arg(
        long = "label-size",
        visible_alias = "ls",
        default_value_t = 14,
        value_parser = clap::value_parser!(u32).range(10..=16)
    )]
    pub label_size: u32,

    /// Size of the icons in the Finder window (16-512)
    #[arg(
        long = "contents-icon-size",
        visible_alias = "cis",
        default_value_t = 128,
        value_parser = clap::value_parser!(u32).range(16..=512)
    )]
    pub contents_icon_size: u32,

    /// DMG format: UDRO, UDRW, UDZO, UDBZ
    #[arg(short = 'f', long, default_value = "UDZO")]
    pub format: ImageFormat,

    /// Compression level (1-9)
    #[arg(long = "compression-level", visible_alias = "cl", default_value = "6")]
    pub compression_level: CompressionLevel,

    /// Stage with hard links where possible
    #[arg(long = "use-hard-links", visible_alias = "hl")]
    pub use_hard_links: bool,

    /// Remove regenerable files from the app bundle before staging
    #[arg(long)]
    pub optimize_app_size: bool,

    /// Build variant
    #[arg(long, value_enum, default_value_t = VariantArg::Auto)]
    pub variant: VariantArg,

    /// Staging strategy: copy, hard-link, safe-hard-link, symlink
    #[arg(long)]
    pub strategy: Option<StagingStrategy>,

    /// Build configuration file (.json, .toml or Cargo.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Abort the build if it runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// `--variant` values; `auto` picks from the format and hard-link flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    Auto,
    Standard,
    Compressed,
    ExactSize,
    HardLinkSafe,
}

impl From<VariantArg> for Option<BuildVariant> {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Auto => None,
            VariantArg::Standard => Some(BuildVariant::Standard),
            VariantArg::Compressed => Some(BuildVariant::Compressed),
            VariantArg::ExactSize => Some(BuildVariant::ExactSize),
            VariantArg::HardLinkSafe => Some(BuildVariant::HardLinkSafe),
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(app) = &self.app {
            if !is_app_bundle_path(app) {
                return Err(format!("not a valid app bundle extension: {}", app.display()));
            }
            if !app.is_dir() {
                return Err(format!("app bundle path must be a directory: {}", app.display()));
            }
        }

        if let Some(icon) = &self.icon {
            let supported = icon.extension().is_some_and(|ext| {
                ext.eq_ignore_ascii_case("icns") || ext.eq_ignore_ascii_case("png")
            });
            if !supported {
                return Err(format!("icon must be an .icns or .png file: {}", icon.display()));
            }
        }

        if self.window_width == 0 || self.window_height == 0 {
            return Err("window width and height must be positive".to_string());
        }

        Ok(())
    }

    /// Builds the configuration these arguments describe.
    pub fn build_config(&self) -> Result<BuildConfig> {
        let mut config = match (&self.config, &self.app) {
            (Some(path), _) => load_config(path)?,
            (None, Some(app)) => self.app_config(app),
            (None, None) => {
                return Err(BundlerError::Cli(CliError::InvalidArguments {
                    reason: "either --app or --config is required".to_string(),
                }));
            }
        };

        if let Some(out) = &self.out {
            config.file_name = Some(out.clone());
        }
        if let Some(title) = &self.title {
            config.title = title.clone();
        }
        if let Some(icon) = &self.icon {
            config.icon = Some(icon.clone());
        }
        if let Some(background) = &self.background {
            config.background = Some(background.clone());
        }
        if let Some(variant) = Option::<BuildVariant>::from(self.variant) {
            config.variant = Some(variant);
        }
        if let Some(strategy) = self.strategy {
            config.strategy = Some(strategy);
        }
        config.use_hard_links |= self.use_hard_links;
        config.optimize_app_size |= self.optimize_app_size;

        Ok(config)
    }

    /// Two-item layout: the app on the left third, `/Applications` on the
    /// right, both vertically centred.
    fn app_config(&self, app: &Path) -> BuildConfig {
        let stem = app
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (app_pos, link_pos) =
            default_positions(self.window_width, self.window_height, self.contents_icon_size, self.label_size);

        let icon = app_icon(app);
        if let Some(icon) = &icon {
            log::info!("Using app icon {}", icon.display());
        }

        BuildConfig {
            file_name: Some(PathBuf::from(format!("{stem}.dmg"))),
            title: stem,
            icon,
            label_size: self.label_size,
            contents_icon_size: self.contents_icon_size,
            window_width: self.window_width,
            window_height: self.window_height,
            contents: vec![
                ContentItem::new(ItemKind::Dir, app, app_pos.0, app_pos.1),
                ContentItem::new(ItemKind::Link, "/Applications", link_pos.0, link_pos.1),
            ],
            format: Some(self.format),
            compression_level: Some(self.compression_level),
            ..Default::default()
        }
    }
}

/// Icon positions for the app and the Applications link.
pub fn default_positions(
    width: u32,
    height: u32,
    icon_size: u32,
    label_size: u32,
) -> ((u32, u32), (u32, u32)) {
    let (w, h, icon) = (f64::from(width), f64::from(height), f64::from(icon_size));
    let to_coord = |v: f64| v.max(0.0) as u32;

    let center_y = to_coord(h / 2.0 - icon / 2.0) + label_size;
    let app_x = to_coord(w / 3.0 - icon / 2.0);
    let link_x = to_coord(w / 3.0 * 2.0 + icon / 2.0);
    ((app_x, center_y), (link_x, center_y))
}
