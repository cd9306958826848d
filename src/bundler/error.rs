//! Error types for disk image assembly.
//!
//! Every failure in the pipeline maps onto one of the [`ErrorCategory`]
//! classes so callers can tell a bad configuration from a flaky `hdiutil`.

use std::{fmt::Display, io, path::PathBuf};

/// Result alias used throughout the bundler.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a build failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing sources, invalid configuration, missing tools.
    Setup,
    /// Copy, link or tree-walk failures while materializing content.
    Staging,
    /// Non-zero exit (or spawn failure) of an external tool.
    ExternalTool,
    /// Detach or temp-file removal problems.
    Cleanup,
    /// Cancelled or timed out through the execution context.
    Cancelled,
}

/// Errors raised while building a disk image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A lower level error wrapped with the step that produced it.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// Filesystem operation failed on a specific path.
    #[error("{context} {path}: {error}")]
    Fs {
        context: &'static str,
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// A configured content item or asset does not exist.
    #[error("source path does not exist: {0}")]
    MissingSource(PathBuf),

    /// Two content items share a base name.
    #[error("duplicate item name {0:?}: base names must be unique within an image")]
    DuplicateItemName(String),

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The exact-size variant needs an `.app` directory among the contents.
    #[error("no .app directory found in contents")]
    NoAppBundle,

    /// A required external tool is not installed.
    #[error("required tool `{0}` was not found in PATH")]
    ToolNotFound(String),

    /// An external tool could not be started.
    #[error("failed to run {command}: {error}")]
    ToolSpawn {
        command: String,
        #[source]
        error: io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("{command} failed ({status}), output: {output}")]
    ToolFailed {
        command: String,
        status: String,
        output: String,
    },

    /// The build was cancelled while `command` was running.
    #[error("cancelled while running {command}")]
    Cancelled { command: String },

    /// The build deadline elapsed while `command` was running.
    #[error("deadline exceeded while running {command}")]
    TimedOut { command: String },

    /// Detach or temp cleanup failed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error(transparent)]
    Plist(#[from] plist::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Classifies the error, looking through context wrappers.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Context(_, inner) => inner.category(),
            Error::MissingSource(_)
            | Error::DuplicateItemName(_)
            | Error::InvalidConfig(_)
            | Error::NoAppBundle
            | Error::ToolNotFound(_)
            | Error::Plist(_)
            | Error::Image(_) => ErrorCategory::Setup,
            Error::Fs { .. }
            | Error::IoError(_)
            | Error::WalkDir(_)
            | Error::StripPrefix(_)
            | Error::GenericError(_) => ErrorCategory::Staging,
            Error::ToolSpawn { .. } | Error::ToolFailed { .. } => ErrorCategory::ExternalTool,
            Error::Cleanup(_) => ErrorCategory::Cleanup,
            Error::Cancelled { .. } | Error::TimedOut { .. } => ErrorCategory::Cancelled,
        }
    }

    /// Returns the innermost error beneath any context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context(_, inner) => inner.root(),
            other => other,
        }
    }
}

/// Attach a description of the failing step to an error.
pub trait Context<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attach the operation and path to raw IO errors.
pub trait ErrorExt<T> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Return early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
