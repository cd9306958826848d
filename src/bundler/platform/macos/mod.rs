//! macOS packaging.

pub mod dmg;
