mod audio;
mod config;
mod diagnostics;
mod error;
mod event;
mod launcher;
mod paths;
mod presentation;
mod relaunch;
mod supervisor;

use std::sync::Arc;

use log::info;
use tokio::sync::mpsc;

use crate::launcher::{Collaborators, Flow, Launcher, Timings};

#[tokio::main]
async fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    // ── Configuration ─────────────────────────────────────────────────────────
    let loaded = config::load(&paths::config_file_path());
    if let config::ConfigSource::Defaults { .. } = loaded.source {
        info!("Edit {} to point at your games", paths::config_file_path().display());
    }

    let (event_tx, mut event_rx) = mpsc::channel::<event::LauncherEvent>(32);

    // ── Collaborators ─────────────────────────────────────────────────────────
    let sink: Arc<dyn diagnostics::DiagnosticSink> = Arc::new(diagnostics::LogSink);
    let deps = Collaborators {
        audio: Arc::new(audio::DeviceBackend::new(paths::audio_dir())),
        supervisor: Arc::new(supervisor::ProcessSupervisor::new(Arc::clone(&sink))),
        relauncher: Box::new(relaunch::ProcessRelauncher::current()),
        sink,
        presentation: Box::new(presentation::ConsolePresentation::spawn(event_tx.clone())),
    };

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(event::LauncherEvent::Shutdown).await;
            }
        });
    }

    info!("mgs-launcher v{} started", env!("CARGO_PKG_VERSION"));

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut launcher = Launcher::new(loaded.config, deps, Timings::default(), event_tx);
    let mut flow = launcher.start();
    while flow == Flow::Continue {
        match event_rx.recv().await {
            Some(evt) => flow = launcher.handle(evt),
            None => break,
        }
    }

    // Dropping the launcher releases any audio still held.
    drop(launcher);
    let code = match flow {
        Flow::Exit(code) => code,
        Flow::Continue => 0,
    };
    std::process::exit(code);
}
