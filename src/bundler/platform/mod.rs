//! Platform-specific image assembly.

pub mod macos;
