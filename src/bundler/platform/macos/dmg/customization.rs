//! Volume appearance: icon, background and Finder layout.
//!
//! Runs against a volume root, which is either the mounted writable image
//! or, for builds that skip the mount, the staging directory itself.
//!
//! # Process
//! 1. Copy the volume icon to `.VolumeIcon.icns` and flag the root
//! 2. Place the background under `.background` and hide that folder
//! 3. Write the layout metadata (always, even without icon or background)

use super::icon::{FinderAttributes, VOLUME_ICON_FILE};
use super::layout::{LayoutWriter, VolumeLayout};
use super::staging::{BACKGROUND_DIR, background_file_name, place_background};
use crate::bundler::{
    error::{Context, ErrorExt, Result},
    settings::BuildConfig,
    utils::ExecContext,
};
use std::path::{Path, PathBuf};

/// Applies icon, background and layout to a volume root.
pub struct VolumeCustomizer<'a, A, L> {
    attributes: &'a A,
    layout: &'a L,
}

impl<'a, A: FinderAttributes, L: LayoutWriter> VolumeCustomizer<'a, A, L> {
    pub fn new(attributes: &'a A, layout: &'a L) -> Self {
        Self { attributes, layout }
    }

    /// Customizes `root` and returns warnings for degraded cosmetic steps.
    ///
    /// `icon` must already be an `.icns` file.
    pub async fn apply(
        &self,
        root: &Path,
        config: &BuildConfig,
        icon: Option<&Path>,
        ctx: &ExecContext,
    ) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(icon) = icon {
            self.apply_volume_icon(root, icon, ctx)
                .await
                .context("setting volume icon")?;
        }

        let background = match &config.background {
            Some(source) => Some(
                self.apply_background(root, source, ctx)
                    .await
                    .context("setting background")?,
            ),
            None => None,
        };

        let layout = VolumeLayout::from_config(config, background)?;
        if let Some(warning) = self.layout.write_layout(root, &layout, ctx).await? {
            warnings.push(warning);
        }
        Ok(warnings)
    }

    async fn apply_volume_icon(&self, root: &Path, icon: &Path, ctx: &ExecContext) -> Result<()> {
        let dest = root.join(VOLUME_ICON_FILE);
        tokio::fs::copy(icon, &dest)
            .await
            .fs_context("copying volume icon", icon)?;
        self.attributes.set_icon_creator(&dest, ctx).await?;
        self.attributes.set_custom_icon(root, ctx).await?;
        log::debug!("Volume icon set from {}", icon.display());
        Ok(())
    }

    /// Returns the background path relative to `root`.
    async fn apply_background(
        &self,
        root: &Path,
        source: &Path,
        ctx: &ExecContext,
    ) -> Result<PathBuf> {
        let relative = Path::new(BACKGROUND_DIR).join(background_file_name(source));
        if !root.join(&relative).is_file() {
            place_background(source, root)?;
        }
        self.attributes
            .set_invisible(&root.join(BACKGROUND_DIR), ctx)
            .await?;
        Ok(relative)
    }
}
