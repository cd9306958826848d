//! macOS disk image builder library
//!
//! This library stages application content, sizes and creates a disk
//! image with `hdiutil`, customizes the mounted volume (icon, background,
//! Finder window layout) and converts it into a distributable `.dmg`.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
