//! External tool detection and availability checking.
//!
//! Every external program a build will invoke is looked up on `PATH` before
//! anything is staged, so a missing Xcode command line tool fails the build
//! as a setup error instead of halfway through.

use crate::bundler::{
    error::{Error, Result},
    settings::BuildConfig,
};
use std::sync::LazyLock;

/// Whether Finder scripting is available for layout metadata.
///
/// Cached result to avoid repeated lookups across builds.
pub static HAS_OSASCRIPT: LazyLock<bool> = LazyLock::new(|| match which::which("osascript") {
    Ok(path) => {
        log::debug!("Found osascript at: {}", path.display());
        true
    }
    Err(e) => {
        log::warn!(
            "osascript not found in PATH: {}. Finder layout will not be written.",
            e
        );
        false
    }
});

/// Programs the given build configuration will invoke.
pub fn required_tools(config: &BuildConfig) -> Vec<&'static str> {
    let mut tools = vec!["hdiutil"];
    if config.icon.is_some() || config.background.is_some() || config.file_icon_path().is_some()
    {
        tools.push("SetFile");
    }
    if config.file_icon_path().is_some() {
        tools.extend(["sips", "DeRez", "Rez"]);
    }
    tools
}

/// Fails with [`Error::ToolNotFound`] for the first missing program.
pub fn ensure_tools(tools: &[&str]) -> Result<()> {
    for tool in tools {
        match which::which(tool) {
            Ok(path) => log::debug!("Found {} at: {}", tool, path.display()),
            Err(_) => return Err(Error::ToolNotFound((*tool).to_string())),
        }
    }
    Ok(())
}
