//! Shared helpers: filesystem staging primitives, external tool execution
//! and progress reporting.

pub mod fs;
pub mod process;
pub mod progress;

pub use process::{ExecContext, ToolOutput, run_tool};
pub use progress::ProgressSink;
