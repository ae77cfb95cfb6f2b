/// Restarting the launcher as a fresh OS process.
///
/// The running executable is located through a resolver function so a failure
/// to find it is an ordinary error the state machine can fall back from.
use std::io;
use std::path::PathBuf;
use std::process::Command;

use log::info;

use crate::error::LaunchError;

pub trait Relauncher {
    /// Starts a new launcher instance. On success the caller must exit.
    fn relaunch(&self) -> Result<(), LaunchError>;
}

type ResolveSelf = Box<dyn Fn() -> io::Result<PathBuf> + Send + Sync>;

/// Re-spawns the launcher executable with no arguments.
pub struct ProcessRelauncher {
    resolve_self: ResolveSelf,
}

impl ProcessRelauncher {
    /// Uses the executable of the current process.
    pub fn current() -> Self {
        Self::with_resolver(std::env::current_exe)
    }

    pub fn with_resolver<F>(resolve_self: F) -> Self
    where
        F: Fn() -> io::Result<PathBuf> + Send + Sync + 'static,
    {
        Self {
            resolve_self: Box::new(resolve_self),
        }
    }
}

impl Relauncher for ProcessRelauncher {
    fn relaunch(&self) -> Result<(), LaunchError> {
        let exe = (self.resolve_self)().map_err(|e| {
            LaunchError::RelaunchFailed(format!("cannot locate launcher executable: {e}"))
        })?;
        let child = Command::new(&exe).spawn().map_err(|e| {
            LaunchError::RelaunchFailed(format!("failed to start {}: {e}", exe.display()))
        })?;
        info!("Relaunched {} (pid {})", exe.display(), child.id());
        Ok(())
    }
}
