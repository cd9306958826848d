//! Kodegen Bundler DMG - drag-to-install disk images for macOS apps.
//!
//! This binary builds a `.dmg` from an `.app` bundle or a configuration
//! file, with proper error handling and cleanup of every mounted volume.

use kodegen_bundler_dmg::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            e.exit_code()
        }
    };

    process::exit(exit_code);
}
