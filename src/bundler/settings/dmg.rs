//! Disk image build configuration.

use crate::bundler::error::{Error, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File extension every produced image carries.
pub const IMAGE_EXTENSION: &str = "dmg";

/// Disk image formats understood by `hdiutil`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Read-only, uncompressed.
    #[serde(rename = "UDRO")]
    Udro,
    /// Read-write, the only format that can be customized after creation.
    #[serde(rename = "UDRW")]
    Udrw,
    /// zlib compressed.
    #[default]
    #[serde(rename = "UDZO")]
    Udzo,
    /// bzip2 compressed.
    #[serde(rename = "UDBZ")]
    Udbz,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [Self::Udro, Self::Udrw, Self::Udzo, Self::Udbz];

    /// Returns the `hdiutil -format` argument.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udro => "UDRO",
            Self::Udrw => "UDRW",
            Self::Udzo => "UDZO",
            Self::Udbz => "UDBZ",
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Udzo | Self::Udbz)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "invalid format: {s}. Valid formats: UDRO, UDRW, UDZO, UDBZ"
                ))
            })
    }
}

/// Compression level passed to `hdiutil convert` (1 fastest, 9 smallest).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "LevelRepr", into = "String")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MAX: CompressionLevel = CompressionLevel(9);

    pub fn new(level: u8) -> Result<Self> {
        if (1..=9).contains(&level) {
            Ok(Self(level))
        } else {
            Err(Error::InvalidConfig(format!(
                "invalid compression level: {level}. Must be between 1-9"
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompressionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let level = s.trim().parse::<u8>().map_err(|_| {
            Error::InvalidConfig(format!("invalid compression level: {s}. Must be between 1-9"))
        })?;
        Self::new(level)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelRepr {
    Number(u8),
    Text(String),
}

impl TryFrom<LevelRepr> for CompressionLevel {
    type Error = Error;

    fn try_from(repr: LevelRepr) -> Result<Self> {
        match repr {
            LevelRepr::Number(n) => Self::new(n),
            LevelRepr::Text(s) => s.parse(),
        }
    }
}

impl From<CompressionLevel> for String {
    fn from(level: CompressionLevel) -> Self {
        level.to_string()
    }
}

/// What a content item is on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[serde(alias = "directory")]
    Dir,
    File,
    #[serde(alias = "symlink")]
    Link,
}

/// One entry placed at the root of the volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Icon position in the Finder window.
    pub x: u32,
    pub y: u32,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Source path, or the link target for [`ItemKind::Link`].
    pub path: PathBuf,
}

impl ContentItem {
    pub fn new(kind: ItemKind, path: impl Into<PathBuf>, x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            kind,
            path: path.into(),
        }
    }

    /// Base name used as the staged name and as the layout key.
    pub fn name(&self) -> Result<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("item path has no base name: {}", self.path.display()))
            })
    }

    /// True for directories whose name ends in `.app`.
    pub fn is_app_bundle(&self) -> bool {
        self.kind == ItemKind::Dir && is_app_bundle_path(&self.path)
    }
}

pub(crate) fn is_app_bundle_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("app"))
}

/// Final assembly flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildVariant {
    /// Stage, write layout into the staging area, create in the target format.
    Standard,
    /// Stage, create a writable intermediate, customize, convert.
    Compressed,
    /// Size from the original content, create straight from the app bundle.
    ExactSize,
    /// Stage with safe hard links into an isolated area, lean sizing.
    HardLinkSafe,
}

impl BuildVariant {
    pub const ALL: [BuildVariant; 4] = [
        Self::Standard,
        Self::Compressed,
        Self::ExactSize,
        Self::HardLinkSafe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Compressed => "compressed",
            Self::ExactSize => "exact-size",
            Self::HardLinkSafe => "hard-link-safe",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "invalid variant: {s}. Valid variants: standard, compressed, exact-size, hard-link-safe"
                ))
            })
    }
}

/// How content items are materialized in the staging area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagingStrategy {
    /// Byte-for-byte copy, with bundle filtering for `.app` directories.
    #[default]
    Copy,
    /// Hard link each leaf file, copying when linking fails.
    HardLink,
    /// Hard link files, bundle-aware copy for directories.
    SafeHardLink,
    /// Symbolic links to the originals.
    Symlink,
}

impl StagingStrategy {
    pub const ALL: [StagingStrategy; 4] = [
        Self::Copy,
        Self::HardLink,
        Self::SafeHardLink,
        Self::Symlink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::HardLink => "hard-link",
            Self::SafeHardLink => "safe-hard-link",
            Self::Symlink => "symlink",
        }
    }
}

impl fmt::Display for StagingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StagingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "invalid strategy: {s}. Valid strategies: copy, hard-link, safe-hard-link, symlink"
                ))
            })
    }
}

/// Everything needed to produce one disk image.
///
/// Field names follow the JSON layout of existing build configurations:
///
/// ```json
/// {
///   "title": "MyApp",
///   "fileName": "MyApp.dmg",
///   "iconSize": 128,
///   "contents": [
///     { "x": 180, "y": 240, "type": "dir", "path": "build/MyApp.app" },
///     { "x": 460, "y": 240, "type": "link", "path": "/Applications" }
///   ],
///   "format": "UDZO",
///   "compressionLevel": "6"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Output image path. Defaults to `{title}.dmg`.
    pub file_name: Option<PathBuf>,

    /// Volume name shown when mounted.
    pub title: String,

    /// Volume icon (`.icns` or `.png`).
    pub icon: Option<PathBuf>,

    /// Icon injected into the image file itself. Defaults to `icon`.
    pub file_icon: Option<PathBuf>,

    /// Finder label text size (10-16).
    pub label_size: u32,

    /// Finder icon size for contents (16-512).
    #[serde(rename = "iconSize")]
    pub contents_icon_size: u32,

    pub window_width: u32,
    pub window_height: u32,

    /// Background image for the Finder window.
    pub background: Option<PathBuf>,

    pub contents: Vec<ContentItem>,

    /// Target format. Defaults to UDZO.
    pub format: Option<ImageFormat>,

    pub compression_level: Option<CompressionLevel>,

    /// Stage through the safe hard-link variant.
    pub use_hard_links: bool,

    /// Strip regenerable files from `.app` bundles before staging.
    pub optimize_app_size: bool,

    /// Overrides automatic variant selection.
    pub variant: Option<BuildVariant>,

    /// Overrides the variant's default staging strategy.
    pub strategy: Option<StagingStrategy>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            file_name: None,
            title: String::new(),
            icon: None,
            file_icon: None,
            label_size: 14,
            contents_icon_size: 128,
            window_width: 640,
            window_height: 480,
            background: None,
            contents: Vec::new(),
            format: None,
            compression_level: None,
            use_hard_links: false,
            optimize_app_size: false,
            variant: None,
            strategy: None,
        }
    }
}

impl BuildConfig {
    /// Output path, always ending in `.dmg`.
    pub fn output_path(&self) -> PathBuf {
        let base = match &self.file_name {
            Some(name) if !name.as_os_str().is_empty() => name.clone(),
            _ => PathBuf::from(&self.title),
        };
        with_image_extension(base)
    }

    /// Target format, UDZO when unset.
    pub fn image_format(&self) -> ImageFormat {
        self.format.unwrap_or_default()
    }

    /// Icon for the image file itself, falling back to the volume icon.
    pub fn file_icon_path(&self) -> Option<&Path> {
        self.file_icon.as_deref().or(self.icon.as_deref())
    }

    /// Checks ranges and item name uniqueness.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty()
            && self.file_name.as_ref().is_none_or(|n| n.as_os_str().is_empty())
        {
            return Err(Error::InvalidConfig(
                "either a title or an output file name is required".into(),
            ));
        }
        if !(10..=16).contains(&self.label_size) {
            return Err(Error::InvalidConfig(format!(
                "label size must be between 10 and 16, got {}",
                self.label_size
            )));
        }
        if !(16..=512).contains(&self.contents_icon_size) {
            return Err(Error::InvalidConfig(format!(
                "contents icon size must be between 16 and 512, got {}",
                self.contents_icon_size
            )));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::InvalidConfig(
                "window width and height must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.contents {
            let name = item.name()?;
            if !seen.insert(name.clone()) {
                return Err(Error::DuplicateItemName(name));
            }
        }
        Ok(())
    }

    /// Validates, fills defaults and makes local paths absolute.
    ///
    /// Link targets are left untouched; they are written verbatim into the
    /// volume.
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;

        if self.title.trim().is_empty() {
            let output = self.output_path();
            self.title = output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        self.file_name = Some(absolute(&self.output_path())?);
        self.format = Some(self.image_format());

        for item in &mut self.contents {
            if item.kind != ItemKind::Link {
                item.path = absolute(&item.path)?;
            }
        }
        for asset in [&mut self.icon, &mut self.file_icon, &mut self.background] {
            if let Some(path) = asset.as_mut() {
                *path = absolute(path)?;
            }
        }
        Ok(self)
    }

    /// The first `.app` directory among the contents.
    pub fn main_app(&self) -> Option<&ContentItem> {
        self.contents.iter().find(|item| item.is_app_bundle())
    }
}

fn with_image_extension(path: PathBuf) -> PathBuf {
    let has_ext = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(IMAGE_EXTENSION));
    if has_ext {
        return path;
    }
    let mut name: OsString = path.into_os_string();
    name.push(".");
    name.push(IMAGE_EXTENSION);
    PathBuf::from(name)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path.absolutize()?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config() -> BuildConfig {
        BuildConfig {
            title: "MyApp".into(),
            contents: vec![
                ContentItem::new(ItemKind::Dir, "/build/MyApp.app", 160, 240),
                ContentItem::new(ItemKind::Link, "/Applications", 480, 240),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn output_defaults_to_title_with_extension() {
        let config = app_config();
        assert_eq!(config.output_path(), PathBuf::from("MyApp.dmg"));
        assert_eq!(config.image_format(), ImageFormat::Udzo);
    }

    #[test]
    fn output_extension_is_appended_once() {
        let mut config = app_config();
        config.file_name = Some("out/Release".into());
        assert_eq!(config.output_path(), PathBuf::from("out/Release.dmg"));
        config.file_name = Some("out/Release.dmg".into());
        assert_eq!(config.output_path(), PathBuf::from("out/Release.dmg"));
    }

    #[test]
    fn duplicate_base_names_are_rejected() {
        let mut config = app_config();
        config
            .contents
            .push(ContentItem::new(ItemKind::Dir, "/other/MyApp.app", 0, 0));
        assert!(matches!(
            config.validate(),
            Err(Error::DuplicateItemName(name)) if name == "MyApp.app"
        ));
    }

    #[test]
    fn ranges_are_checked() {
        let mut config = app_config();
        config.label_size = 9;
        assert!(config.validate().is_err());
        config.label_size = 12;
        config.contents_icon_size = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn normalized_fills_defaults_and_keeps_link_targets() {
        let config = app_config().normalized().unwrap();
        assert_eq!(config.format, Some(ImageFormat::Udzo));
        assert!(config.output_path().is_absolute());
        assert!(config.output_path().ends_with("MyApp.dmg"));
        assert_eq!(config.contents[1].path, PathBuf::from("/Applications"));
        assert_eq!(config.contents[1].name().unwrap(), "Applications");
    }

    #[test]
    fn json_uses_original_field_names() {
        let json = r#"{
            "title": "Demo",
            "iconSize": 96,
            "labelSize": 12,
            "compressionLevel": "9",
            "format": "UDBZ",
            "useHardLinks": true,
            "contents": [{ "x": 1, "y": 2, "type": "dir", "path": "/tmp/Demo.app" }]
        }"#;
        let config: BuildConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.contents_icon_size, 96);
        assert_eq!(config.compression_level, Some(CompressionLevel::MAX));
        assert_eq!(config.image_format(), ImageFormat::Udbz);
        assert!(config.use_hard_links);
        assert_eq!(config.window_width, 640);
        assert!(config.contents[0].is_app_bundle());
    }

    #[test]
    fn compression_level_bounds() {
        assert!("0".parse::<CompressionLevel>().is_err());
        assert!("10".parse::<CompressionLevel>().is_err());
        assert_eq!("7".parse::<CompressionLevel>().unwrap().get(), 7);
        assert_eq!("udzo".parse::<ImageFormat>().unwrap(), ImageFormat::Udzo);
    }
}
