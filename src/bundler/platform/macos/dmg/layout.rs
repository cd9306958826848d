//! Finder window layout for the volume.
//!
//! [`VolumeLayout`] is the layout description derived from a build
//! configuration. A [`LayoutWriter`] turns it into the hidden `.DS_Store`
//! Finder reads when the volume is opened.

use crate::bundler::{
    builder::tool_detection::HAS_OSASCRIPT,
    error::Result,
    settings::BuildConfig,
    utils::{ExecContext, run_tool},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Hidden metadata file Finder keeps window settings in.
pub const LAYOUT_FILE: &str = ".DS_Store";

/// Window origin used for the Finder bounds.
const WINDOW_ORIGIN: (u32, u32) = (100, 100);

/// Everything Finder needs to present the volume window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLayout {
    pub icon_size: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub label_size: u32,
    pub label_on_bottom: bool,
    /// Background path relative to the volume root.
    pub background: Option<PathBuf>,
    /// Item base name to icon position.
    pub positions: BTreeMap<String, (u32, u32)>,
}

impl VolumeLayout {
    /// Derives the layout from `config`; `background` is the staged
    /// background relative to the volume root.
    pub fn from_config(config: &BuildConfig, background: Option<PathBuf>) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for item in &config.contents {
            positions.insert(item.name()?, (item.x, item.y));
        }
        Ok(Self {
            icon_size: config.contents_icon_size,
            window_width: config.window_width,
            window_height: config.window_height,
            label_size: config.label_size,
            label_on_bottom: true,
            background,
            positions,
        })
    }
}

/// Writes [`VolumeLayout`] into a staged or mounted volume root.
///
/// `Ok(Some(message))` reports a degraded write the build tolerates.
#[allow(async_fn_in_trait)]
pub trait LayoutWriter {
    async fn write_layout(
        &self,
        root: &Path,
        layout: &VolumeLayout,
        ctx: &ExecContext,
    ) -> Result<Option<String>>;
}

/// [`LayoutWriter`] that has Finder write `.DS_Store` via AppleScript.
#[derive(Debug, Clone)]
pub struct FinderLayoutWriter {
    /// How long to wait for Finder to flush `.DS_Store`.
    pub settle_timeout: Duration,
}

impl Default for FinderLayoutWriter {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_secs(10),
        }
    }
}

impl LayoutWriter for FinderLayoutWriter {
    async fn write_layout(
        &self,
        root: &Path,
        layout: &VolumeLayout,
        ctx: &ExecContext,
    ) -> Result<Option<String>> {
        if !*HAS_OSASCRIPT {
            return Ok(Some("osascript not available, Finder layout not written".to_string()));
        }
        log::debug!("Running AppleScript to lay out {}", root.display());

        let script = finder_script(root, layout);
        if let Err(e) = run_tool(ctx, "osascript", ["-e", script.as_str()]).await {
            // Finder is unavailable on headless hosts; the image is still valid.
            if ctx.is_cancelled() {
                return Err(e);
            }
            return Ok(Some(format!("Finder layout script failed: {e}")));
        }

        let ds_store = root.join(LAYOUT_FILE);
        let deadline = tokio::time::Instant::now() + self.settle_timeout;
        while !ds_store.exists() {
            if tokio::time::Instant::now() >= deadline {
                return Ok(Some(format!(
                    "{} was not written within {:?}",
                    ds_store.display(),
                    self.settle_timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Ok(None)
    }
}

/// Escapes a value for an AppleScript string literal.
fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', r"\\").replace('"', r#"\""#)
}

fn finder_script(root: &Path, layout: &VolumeLayout) -> String {
    let (left, top) = WINDOW_ORIGIN;
    let folder = escape_applescript_string(&root.to_string_lossy());

    let background_clause = match &layout.background {
        Some(bg) => {
            // HFS-style path, relative only inside `tell target`.
            let hfs = bg
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(":");
            format!(
                r#"set background picture of viewOptions to file "{}""#,
                escape_applescript_string(&hfs)
            )
        }
        None => String::new(),
    };

    let positions: String = layout
        .positions
        .iter()
        .map(|(name, (x, y))| {
            format!(
                "set position of item \"{}\" to {{{x}, {y}}}\n",
                escape_applescript_string(name)
            )
        })
        .collect();

    format!(
        r#"
        tell application "Finder"
            set target to (POSIX file "{folder}" as alias)
            open target
            set theWindow to container window of target
            set current view of theWindow to icon view
            set toolbar visible of theWindow to false
            set statusbar visible of theWindow to false
            set bounds of theWindow to {{{left}, {top}, {right}, {bottom}}}
            set viewOptions to icon view options of theWindow
            set arrangement of viewOptions to not arranged
            set icon size of viewOptions to {icon_size}
            set text size of viewOptions to {label_size}
            set label position of viewOptions to {label_position}
            tell target
                {background_clause}
                {positions}
            end tell
            close theWindow
            open target
            update target without registering applications
            delay 2
            close container window of target
        end tell
        "#,
        right = left + layout.window_width,
        bottom = top + layout.window_height,
        icon_size = layout.icon_size,
        label_size = layout.label_size,
        label_position = if layout.label_on_bottom { "bottom" } else { "right" },
    )
}
