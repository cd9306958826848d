//! Build orchestration and coordination.
//!
//! This module provides the [`Builder`] that turns a [`BuildConfig`] into a
//! finished disk image and a [`BuiltImage`] report.
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA256 checksum of the produced image
//! - [`orchestrator`] - [`Builder`], variant selection and work directories
//! - [`tool_detection`] - External tool availability checking
//!
//! [`BuildConfig`]: crate::bundler::BuildConfig
//! [`BuiltImage`]: crate::bundler::BuiltImage

pub mod checksum;
pub mod orchestrator;
pub mod tool_detection;

pub use orchestrator::{BuildOptions, Builder, select_variant};
