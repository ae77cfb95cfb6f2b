/// Line-oriented diagnostic output: child process output and launch failures.
use log::{error, info};

use crate::error::LaunchError;

pub trait DiagnosticSink: Send + Sync {
    /// One line of combined stdout/stderr from a launched program.
    fn child_output(&self, line: &str);
    /// A failure that was recovered from.
    fn failure(&self, err: &LaunchError);
}

/// Forwards diagnostics to the `log` facade.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn child_output(&self, line: &str) {
        info!(target: "launch", "Launch output: {line}");
    }

    fn failure(&self, err: &LaunchError) {
        error!("{err}");
    }
}
