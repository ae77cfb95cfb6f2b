/// External process supervision: resolve a configured path, spawn it, stream
/// its output and wait for it to exit.
///
/// The child runs under `tokio::process`; its stdout and stderr are forwarded
/// line by line from their own tasks while [`supervise`] waits on the exit
/// status, then holds the result for the settle delay so the child has
/// released the display and audio device before the launcher restarts.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::diagnostics::DiagnosticSink;
use crate::error::LaunchError;

/// Pause between the child exiting and the launcher reporting completion.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

const SHORTCUT_EXTENSION: &str = "lnk";

#[cfg(windows)]
const SHELL_OPEN: &str = "explorer.exe";
#[cfg(target_os = "macos")]
const SHELL_OPEN: &str = "open";
#[cfg(not(any(windows, target_os = "macos")))]
const SHELL_OPEN: &str = "xdg-open";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Spawned directly with its parent directory as working directory.
    DirectExecutable,
    /// Handed to the platform shell so the OS resolves the shortcut.
    ShortcutIndirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub kind: TargetKind,
    pub absolute_path: PathBuf,
}

impl ResolvedTarget {
    /// Working directory for direct executables; shortcuts carry their own.
    pub fn working_dir(&self) -> Option<&Path> {
        match self.kind {
            TargetKind::DirectExecutable => self.absolute_path.parent(),
            TargetKind::ShortcutIndirection => None,
        }
    }
}

/// A running child. Only the supervisor that created it can wait on it.
pub struct ProcessHandle {
    pub target_path: PathBuf,
    pub pid: Option<u32>,
    child: Option<Child>,
}

impl ProcessHandle {
    #[cfg(test)]
    pub(crate) fn detached(target_path: PathBuf) -> Self {
        Self {
            target_path,
            pid: None,
            child: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Normal,
    NonZero(Option<i32>),
    SupervisorError,
}

/// What happened to a launch request.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    /// The target did not exist; nothing was spawned.
    NotFound(String),
    /// The target was spawned (or spawning failed) and has finished.
    Exited(ExitStatus),
}

#[async_trait]
pub trait Supervisor: Send + Sync {
    fn resolve(&self, path: &str) -> Result<ResolvedTarget, LaunchError>;
    /// Spawns the target. Must be called from within the tokio runtime.
    fn launch(&self, target: &ResolvedTarget) -> Result<ProcessHandle, LaunchError>;
    /// Resolves once the child exits, forwarding its output as it arrives.
    async fn await_exit(&self, handle: ProcessHandle) -> ExitStatus;
}

/// Spawns real OS processes.
pub struct ProcessSupervisor {
    sink: Arc<dyn DiagnosticSink>,
}

impl ProcessSupervisor {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    fn resolve(&self, path: &str) -> Result<ResolvedTarget, LaunchError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(LaunchError::TargetNotFound {
                path: path.to_string(),
            });
        }
        let absolute_path = std::path::absolute(trimmed)
            .map_err(|e| LaunchError::Supervisor(format!("cannot resolve {trimmed}: {e}")))?;
        let is_shortcut = absolute_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SHORTCUT_EXTENSION));
        let kind = if is_shortcut {
            TargetKind::ShortcutIndirection
        } else {
            TargetKind::DirectExecutable
        };
        Ok(ResolvedTarget {
            kind,
            absolute_path,
        })
    }

    fn launch(&self, target: &ResolvedTarget) -> Result<ProcessHandle, LaunchError> {
        if !target.absolute_path.exists() {
            return Err(LaunchError::TargetNotFound {
                path: target.absolute_path.display().to_string(),
            });
        }

        let mut command = match target.kind {
            TargetKind::ShortcutIndirection => {
                let mut c = Command::new(SHELL_OPEN);
                c.arg(&target.absolute_path);
                c
            }
            TargetKind::DirectExecutable => Command::new(&target.absolute_path),
        };
        if let Some(dir) = target.working_dir() {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| {
            LaunchError::Supervisor(format!(
                "failed to start {}: {e}",
                target.absolute_path.display()
            ))
        })?;

        Ok(ProcessHandle {
            target_path: target.absolute_path.clone(),
            pid: child.id(),
            child: Some(child),
        })
    }

    async fn await_exit(&self, handle: ProcessHandle) -> ExitStatus {
        let Some(mut child) = handle.child else {
            self.sink.failure(&LaunchError::Supervisor(format!(
                "no child process for {}",
                handle.target_path.display()
            )));
            return ExitStatus::SupervisorError;
        };

        // Both pipes are read concurrently so neither can fill up and stall
        // the child.
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, Arc::clone(&self.sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, Arc::clone(&self.sink)));
        }

        let status = child.wait().await;
        for reader in readers {
            let _ = reader.await;
        }

        match status {
            Ok(s) if s.success() => ExitStatus::Normal,
            Ok(s) => ExitStatus::NonZero(s.code()),
            Err(e) => {
                self.sink.failure(&LaunchError::Supervisor(format!(
                    "failed waiting on {}: {e}",
                    handle.target_path.display()
                )));
                ExitStatus::SupervisorError
            }
        }
    }
}

fn forward_lines<R>(stream: R, sink: Arc<dyn DiagnosticSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => sink.child_output(&line),
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading child output: {e}");
                    break;
                }
            }
        }
    })
}

/// Runs resolve → existence check → launch → wait. The existence check comes
/// before `launch` so a missing game is reported without spawning anything.
pub async fn run_target(
    supervisor: &dyn Supervisor,
    path: &str,
    sink: &dyn DiagnosticSink,
) -> LaunchOutcome {
    let failed = |e: LaunchError| {
        sink.failure(&e);
        if e.is_not_found() {
            LaunchOutcome::NotFound(path.to_string())
        } else {
            LaunchOutcome::Exited(ExitStatus::SupervisorError)
        }
    };

    let target = match supervisor.resolve(path) {
        Ok(t) => t,
        Err(e) => return failed(e),
    };
    if !target.absolute_path.exists() {
        return failed(LaunchError::TargetNotFound {
            path: path.to_string(),
        });
    }

    let handle = match supervisor.launch(&target) {
        Ok(h) => h,
        Err(e) => return failed(e),
    };
    info!(
        "Launched {} ({:?}, pid {})",
        handle.target_path.display(),
        target.kind,
        handle.pid.map_or_else(|| "?".to_string(), |p| p.to_string())
    );

    let status = supervisor.await_exit(handle).await;
    info!("{path} exited: {status:?}");
    LaunchOutcome::Exited(status)
}

/// Runs [`run_target`] on its own task, then waits out `settle` before
/// returning, whatever the outcome.
pub async fn supervise(
    supervisor: Arc<dyn Supervisor>,
    sink: Arc<dyn DiagnosticSink>,
    path: String,
    settle: Duration,
) -> LaunchOutcome {
    let task_sink = Arc::clone(&sink);
    let task = tokio::spawn(async move {
        run_target(supervisor.as_ref(), &path, task_sink.as_ref()).await
    });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            sink.failure(&LaunchError::Supervisor(format!("supervisor task failed: {e}")));
            LaunchOutcome::Exited(ExitStatus::SupervisorError)
        }
    };
    tokio::time::sleep(settle).await;
    outcome
}


#[cfg(test)]
mod tests {
    use super::testing::FakeSupervisor;
    use super::*;
    use crate::diagnostics::testing::MemorySink;

    fn supervisor() -> (ProcessSupervisor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (ProcessSupervisor::new(sink.clone()), sink)
    }

    // ── resolve ───────────────────────────────────────────────────────────────

    #[test]
    fn resolve_lnk_is_shortcut_case_insensitive() {
        let (sup, _) = supervisor();
        let target = sup.resolve("/games/GroundZeroes.exe.LNK").unwrap();
        assert_eq!(target.kind, TargetKind::ShortcutIndirection);
        assert_eq!(target.working_dir(), None);
    }

    #[test]
    fn resolve_exe_is_direct_with_parent_working_dir() {
        let (sup, _) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("mgsvtpp.exe");
        let target = sup.resolve(exe.to_str().unwrap()).unwrap();
        assert_eq!(target.kind, TargetKind::DirectExecutable);
        assert_eq!(target.absolute_path, exe);
        assert_eq!(target.working_dir(), Some(dir.path()));
    }

    #[test]
    fn resolve_makes_relative_paths_absolute() {
        let (sup, _) = supervisor();
        let target = sup.resolve("games/gz.exe").unwrap();
        assert!(target.absolute_path.is_absolute());
        assert!(target.absolute_path.ends_with("games/gz.exe"));
    }

    #[test]
    fn resolve_empty_path_is_not_found() {
        let (sup, _) = supervisor();
        assert!(sup.resolve("  ").unwrap_err().is_not_found());
    }

    // ── launch ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn launch_missing_target_is_not_found() {
        let (sup, _) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let target = sup
            .resolve(dir.path().join("missing.exe").to_str().unwrap())
            .unwrap();
        let err = sup.launch(&target).err().unwrap();
        assert!(matches!(err, LaunchError::TargetNotFound { .. }));
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        write_with_interpreter(dir, "/bin/sh", body)
    }

    #[cfg(unix)]
    fn write_with_interpreter(dir: &Path, interpreter: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("game.sh");
        std::fs::write(&path, format!("#!{interpreter}\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Freshly written scripts can briefly fail with ETXTBSY while another
    /// test thread is forking.
    #[cfg(unix)]
    async fn launch_script(sup: &ProcessSupervisor, target: &ResolvedTarget) -> ProcessHandle {
        for _ in 0..20 {
            match sup.launch(target) {
                Ok(handle) => return handle,
                Err(e) if e.to_string().contains("busy") => {
                    tokio::time::sleep(Duration::from_millis(50)).await
                }
                Err(e) => panic!("launch failed: {e}"),
            }
        }
        panic!("script stayed busy");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn direct_launch_runs_in_parent_dir_and_streams_output() {
        let (sup, sink) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "pwd\necho 'to stderr' >&2\necho done");

        let target = sup.resolve(script.to_str().unwrap()).unwrap();
        let handle = launch_script(&sup, &target).await;
        assert!(handle.pid.is_some());
        assert_eq!(sup.await_exit(handle).await, ExitStatus::Normal);

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        // stdout and stderr are read concurrently, so only stdout order is fixed.
        let pwd = lines.iter().find(|l| l.starts_with('/')).unwrap();
        let cwd = PathBuf::from(pwd).canonicalize().unwrap();
        assert_eq!(cwd, dir.path().canonicalize().unwrap());
        assert!(lines.contains(&"to stderr".to_string()));
        assert!(lines.contains(&"done".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_forwarded_while_the_child_runs() {
        let (sup, sink) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "echo first\nsleep 1\necho last");

        let target = sup.resolve(script.to_str().unwrap()).unwrap();
        let handle = launch_script(&sup, &target).await;
        let sup = Arc::new(sup);
        let waiter = tokio::spawn({
            let sup = Arc::clone(&sup);
            async move { sup.await_exit(handle).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while !sink.lines().contains(&"first".to_string()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first line never arrived");
        assert!(!waiter.is_finished());
        assert_eq!(sink.lines(), vec!["first".to_string()]);

        assert_eq!(waiter.await.unwrap(), ExitStatus::Normal);
        assert_eq!(sink.lines(), vec!["first".to_string(), "last".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let (sup, _) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 3");

        let target = sup.resolve(script.to_str().unwrap()).unwrap();
        let handle = launch_script(&sup, &target).await;
        assert_eq!(sup.await_exit(handle).await, ExitStatus::NonZero(Some(3)));
    }

    #[tokio::test]
    async fn await_without_child_is_supervisor_error() {
        let (sup, sink) = supervisor();
        let status = sup.await_exit(ProcessHandle::detached(PathBuf::from("/x"))).await;
        assert_eq!(status, ExitStatus::SupervisorError);
        assert_eq!(sink.failures().len(), 1);
    }

    // ── run_target / supervise ────────────────────────────────────────────────

    #[tokio::test]
    async fn run_target_missing_file_never_launches() {
        let sup = FakeSupervisor::new(ExitStatus::Normal);
        let sink = MemorySink::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gz.exe").display().to_string();

        let outcome = run_target(&sup, &path, &sink).await;

        assert_eq!(outcome, LaunchOutcome::NotFound(path.clone()));
        assert_eq!(sup.launch_count(), 0);
        assert_eq!(sink.failures()[0].to_string(), format!("Game not found: {path}"));
    }

    #[tokio::test]
    async fn run_target_existing_file_launches_and_waits() {
        let sup = FakeSupervisor::new(ExitStatus::NonZero(Some(1)));
        let sink = MemorySink::default();
        let file = tempfile::NamedTempFile::new().unwrap();

        let outcome = run_target(&sup, file.path().to_str().unwrap(), &sink).await;

        assert_eq!(outcome, LaunchOutcome::Exited(ExitStatus::NonZero(Some(1))));
        assert_eq!(sup.launch_count(), 1);
        assert!(sink.failures().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_target_that_fails_to_spawn_is_a_supervisor_error() {
        let (sup, sink) = supervisor();
        let dir = tempfile::tempdir().unwrap();
        let script = write_with_interpreter(dir.path(), "/nonexistent/interpreter", "exit 0");
        let path = script.display().to_string();

        let outcome = run_target(&sup, &path, sink.as_ref()).await;

        assert!(script.exists());
        assert_eq!(outcome, LaunchOutcome::Exited(ExitStatus::SupervisorError));
        let failures = sink.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], LaunchError::Supervisor(_)));
        assert!(!failures[0].to_string().starts_with("Game not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn supervise_waits_out_the_settle_delay() {
        let sup = Arc::new(FakeSupervisor::new(ExitStatus::Normal));
        let sink = Arc::new(MemorySink::default());
        let file = tempfile::NamedTempFile::new().unwrap();

        let started = tokio::time::Instant::now();
        let outcome = supervise(
            sup,
            sink,
            file.path().display().to_string(),
            SETTLE_DELAY,
        )
        .await;

        assert_eq!(outcome, LaunchOutcome::Exited(ExitStatus::Normal));
        assert!(started.elapsed() >= SETTLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn supervise_maps_panics_to_supervisor_error() {
        let mut sup = FakeSupervisor::new(ExitStatus::Normal);
        sup.panic_on_launch = true;
        let sink = Arc::new(MemorySink::default());
        let file = tempfile::NamedTempFile::new().unwrap();

        let outcome = supervise(
            Arc::new(sup),
            sink.clone(),
            file.path().display().to_string(),
            SETTLE_DELAY,
        )
        .await;

        assert_eq!(outcome, LaunchOutcome::Exited(ExitStatus::SupervisorError));
        assert_eq!(sink.failures().len(), 1);
    }
}
