//! Command line interface for the DMG builder.
//!
//! Parses arguments, wires Ctrl-C and `--timeout` into the build's
//! [`ExecContext`], runs the [`Builder`] and prints the result.

mod args;

pub use args::{Args, VariantArg, default_positions};

use crate::bundler::{BuildOptions, Builder, BuiltImage, ExecContext, ProgressSink};
use crate::error::{CliError, Result};
use anyhow::Context as _;
use std::io::Write;
use std::time::Duration;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}

/// Runs a build for already-parsed arguments.
pub async fn execute(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;
    let config = args.build_config()?;

    let mut context = ExecContext::new();
    if let Some(secs) = args.timeout {
        context = context.with_timeout(Duration::from_secs(secs));
    }

    // Ctrl-C cancels the running tool; cleanup still runs.
    let token = context.cancellation_token().clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling build");
            token.cancel();
        }
    });

    let options = BuildOptions {
        context,
        progress: ProgressSink::stdout(),
        ..Default::default()
    };
    let result = Builder::new().options(options).build(config).await;
    watcher.abort();

    print_summary(&result?)?;
    Ok(0)
}

fn print_summary(image: &BuiltImage) -> Result<()> {
    write_summary(&mut std::io::stdout().lock(), image).context("failed to write build summary")?;
    Ok(())
}

fn write_summary(out: &mut impl Write, image: &BuiltImage) -> std::io::Result<()> {
    writeln!(out, "Image:    {}", image.path.display())?;
    writeln!(out, "Variant:  {}", image.variant)?;
    writeln!(out, "Size:     {} bytes", image.size)?;
    writeln!(out, "SHA256:   {}", image.checksum)?;
    for warning in &image.warnings {
        writeln!(out, "Warning:  {warning}")?;
    }
    Ok(())
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

/// Validate arguments without executing (for testing)
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    args.validate()
}
