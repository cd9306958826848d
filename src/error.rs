//! Error types for the command line front-end.
//!
//! Library failures arrive as [`crate::bundler::Error`] and are wrapped here
//! together with argument and configuration-file errors.

use crate::bundler::ErrorCategory;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for the binary
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Build errors
    #[error("Build error: {0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        let category = match self {
            BundlerError::Bundler(e) => e.category(),
            BundlerError::Cli(_) | BundlerError::Json(_) | BundlerError::Toml(_) => {
                ErrorCategory::Setup
            }
            BundlerError::Io(_) | BundlerError::Anyhow(_) => ErrorCategory::Staging,
        };
        match category {
            ErrorCategory::Setup => vec![
                "Check the paths and values passed on the command line or in the config file"
                    .to_string(),
                "Install the Xcode command line tools if a tool was not found".to_string(),
            ],
            ErrorCategory::Staging => {
                vec!["Check free disk space and permissions on the source and temp directories".to_string()]
            }
            ErrorCategory::ExternalTool => vec![
                "The tool output above describes the failure".to_string(),
                "Run `hdiutil info` to look for images left attached by earlier runs".to_string(),
            ],
            ErrorCategory::Cleanup => {
                vec!["Detach stray volumes with `hdiutil detach -force <mount point>`".to_string()]
            }
            ErrorCategory::Cancelled => {
                vec!["Raise --timeout if the image is large".to_string()]
            }
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BundlerError::Cli(_) => 2,
            BundlerError::Bundler(e) if e.category() == ErrorCategory::Cancelled => 130,
            _ => 1,
        }
    }
}
