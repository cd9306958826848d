//! Configuration structures for disk image builds.
//!
//! [`BuildConfig`] is the single input to a build. It deserializes from the
//! JSON/TOML layout used by existing build configurations and can also be
//! assembled through [`BuildConfigBuilder`].

mod builder;
mod dmg;

pub use builder::BuildConfigBuilder;
pub use dmg::{
    BuildConfig, BuildVariant, CompressionLevel, ContentItem, IMAGE_EXTENSION, ImageFormat,
    ItemKind, StagingStrategy,
};
pub(crate) use dmg::is_app_bundle_path;
