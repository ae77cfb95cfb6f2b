use std::path::PathBuf;

use thiserror::Error;

use crate::config::TargetId;

/// Every failure the launcher can observe. None of these is fatal: each one is
/// reported to the diagnostic sink and degrades to a well-defined transition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    /// The config file could not be read or parsed; defaults are used instead.
    #[error("Config unreadable at {}: {reason}", path.display())]
    ConfigUnreadable { path: PathBuf, reason: String },

    /// An audio source could not be decoded or the output device could not be opened.
    #[error("Audio '{source_id}' unavailable: {reason}")]
    ResourceUnavailable { source_id: String, reason: String },

    /// The configured launch path does not exist on disk.
    #[error("Game not found: {path}")]
    TargetNotFound { path: String },

    /// The configured launch path is empty.
    #[error("Game path not configured for {0}. Please edit config.toml next to the launcher.")]
    Unconfigured(TargetId),

    /// Spawning or waiting on the child failed.
    #[error("Launch failed: {0}")]
    Supervisor(String),

    /// The launcher could not start a fresh instance of itself.
    #[error("Relaunch failed: {0}")]
    RelaunchFailed(String),
}

impl LaunchError {
    /// True for both flavours of "there is nothing to launch".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TargetNotFound { .. } | Self::Unconfigured(_))
    }
}
