//! Builder for constructing BuildConfig.

use super::{
    BuildConfig, BuildVariant, CompressionLevel, ContentItem, ImageFormat, ItemKind,
    StagingStrategy,
};
use std::path::{Path, PathBuf};

/// Builder for constructing [`BuildConfig`].
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_dmg::bundler::{BuildConfigBuilder, ImageFormat, ItemKind};
///
/// # fn example() -> kodegen_bundler_dmg::bundler::Result<()> {
/// let config = BuildConfigBuilder::new()
///     .title("MyApp")
///     .item(ItemKind::Dir, "target/release/bundle/macos/MyApp.app", 160, 240)
///     .item(ItemKind::Link, "/Applications", 480, 240)
///     .format(ImageFormat::Udzo)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the volume title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    /// Sets the output image path.
    pub fn file_name<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.file_name = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn icon<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.icon = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets an icon for the image file distinct from the volume icon.
    pub fn file_icon<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.file_icon = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn background<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.background = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.config.window_width = width;
        self.config.window_height = height;
        self
    }

    pub fn label_size(mut self, size: u32) -> Self {
        self.config.label_size = size;
        self
    }

    pub fn contents_icon_size(mut self, size: u32) -> Self {
        self.config.contents_icon_size = size;
        self
    }

    /// Adds a content item at the given window position.
    pub fn item(mut self, kind: ItemKind, path: impl Into<PathBuf>, x: u32, y: u32) -> Self {
        self.config.contents.push(ContentItem::new(kind, path, x, y));
        self
    }

    pub fn contents(mut self, contents: Vec<ContentItem>) -> Self {
        self.config.contents = contents;
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.config.format = Some(format);
        self
    }

    pub fn compression_level(mut self, level: CompressionLevel) -> Self {
        self.config.compression_level = Some(level);
        self
    }

    pub fn use_hard_links(mut self, enabled: bool) -> Self {
        self.config.use_hard_links = enabled;
        self
    }

    pub fn optimize_app_size(mut self, enabled: bool) -> Self {
        self.config.optimize_app_size = enabled;
        self
    }

    pub fn variant(mut self, variant: BuildVariant) -> Self {
        self.config.variant = Some(variant);
        self
    }

    pub fn strategy(mut self, strategy: StagingStrategy) -> Self {
        self.config.strategy = Some(strategy);
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if [`BuildConfig::validate`] rejects it.
    pub fn build(self) -> crate::bundler::Result<BuildConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_items_in_order() {
        let config = BuildConfigBuilder::new()
            .title("Demo")
            .item(ItemKind::Dir, "/x/Demo.app", 10, 20)
            .item(ItemKind::Link, "/Applications", 30, 20)
            .window_size(800, 600)
            .build()
            .unwrap();
        assert_eq!(config.contents.len(), 2);
        assert_eq!(config.contents[1].x, 30);
        assert_eq!(config.window_width, 800);
    }

    #[test]
    fn builder_rejects_missing_title() {
        assert!(BuildConfigBuilder::new().build().is_err());
    }
}
