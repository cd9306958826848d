//! Caller-supplied destination for build progress lines.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Where human-readable progress goes.
///
/// Progress is written to the sink and mirrored to the `log` facade, so a
/// library caller can capture it while the CLI prints it to stdout.
#[derive(Clone)]
pub struct ProgressSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ProgressSink {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Progress on standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Drops progress lines; `log` still receives them.
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    /// Reports a pipeline step.
    pub fn step(&self, message: &str) {
        log::info!("{}", message);
        self.write_line(message);
    }

    /// Reports a degraded but non-fatal step.
    pub fn warn(&self, message: &str) {
        log::warn!("{}", message);
        self.write_line(&format!("Warning: {message}"));
    }

    fn write_line(&self, line: &str) {
        // A poisoned lock only means another writer panicked mid-line.
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            log::debug!("progress sink write failed: {}", e);
        }
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}
