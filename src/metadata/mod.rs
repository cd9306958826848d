//! Build configuration files.
//!
//! A configuration is read from JSON (`.json`), TOML (`.toml`), or a Cargo
//! manifest's `[package.metadata.dmg]` table. Relative paths in the file
//! are resolved against the file's directory.

use crate::bundler::{BuildConfig, ItemKind};
use crate::error::{BundlerError, CliError, Result};
use std::path::Path;

/// Manifest file name recognized as a Cargo package.
const CARGO_MANIFEST: &str = "Cargo.toml";

/// Load a [`BuildConfig`] from `path`.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        BundlerError::Cli(CliError::ExecutionFailed {
            command: "read_config".to_string(),
            reason: format!("Failed to read {}: {}", path.display(), e),
        })
    })?;

    let is_manifest = path.file_name().is_some_and(|n| n == CARGO_MANIFEST);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut config = if is_manifest {
        parse_cargo_metadata(&text)?
    } else {
        match extension.as_str() {
            "json" => serde_json::from_str(&text)?,
            "toml" => toml::from_str(&text)?,
            other => {
                return Err(BundlerError::Cli(CliError::InvalidArguments {
                    reason: format!(
                        "Unsupported config format '{}' for {} (expected .json or .toml)",
                        other,
                        path.display()
                    ),
                }));
            }
        }
    };

    if let Some(base) = path.parent() {
        resolve_relative(&mut config, base);
    }
    log::debug!(
        "Loaded {} content items from {}",
        config.contents.len(),
        path.display()
    );
    Ok(config)
}

/// Extracts `[package.metadata.dmg]` from a Cargo manifest.
fn parse_cargo_metadata(manifest: &str) -> Result<BuildConfig> {
    let toml_value: toml::Value = toml::from_str(manifest)?;

    let table = toml_value
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("dmg"))
        .cloned()
        .ok_or_else(|| {
            BundlerError::Cli(CliError::InvalidArguments {
                reason: "No [package.metadata.dmg] section in Cargo.toml".to_string(),
            })
        })?;

    let mut config: BuildConfig = table.try_into()?;

    // Fall back to the package name for the volume title
    if config.title.is_empty() && config.file_name.is_none() {
        if let Some(name) = toml_value
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
        {
            config.title = name.to_string();
        }
    }
    Ok(config)
}

fn resolve_relative(config: &mut BuildConfig, base: &Path) {
    for item in &mut config.contents {
        if item.kind != ItemKind::Link && item.path.is_relative() {
            item.path = base.join(&item.path);
        }
    }
    for asset in [
        &mut config.icon,
        &mut config.file_icon,
        &mut config.background,
        &mut config.file_name,
    ] {
        if let Some(path) = asset.as_mut().filter(|p| p.is_relative()) {
            *path = base.join(&*path);
        }
    }
}
