/// The launch-lifecycle state machine.
///
/// `Launcher` runs on the control thread and is the only writer of
/// [`LauncherState`]. Every long-running operation (audio open, process
/// supervision, the splash and settle delays) runs on a background context and
/// reports back by posting a [`LauncherEvent`] on the single event queue, which
/// `main` feeds into [`Launcher::handle`] in arrival order.
///
/// Audio ownership: the theme loop lives in `theme` and is the only Loop
/// resource ever started. One-shots live in `one_shots` until their completion
/// event arrives. Both are stopped and released before any launch and before
/// the process exits.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::audio::{AudioBackend, AudioMode, AudioResource, HOVER_SOURCE, INTRO_SOURCE, THEME_SOURCE};
use crate::config::{LaunchConfig, LaunchTarget};
use crate::diagnostics::DiagnosticSink;
use crate::error::LaunchError;
use crate::event::{Cue, Intent, LauncherEvent};
use crate::presentation::Presentation;
use crate::relaunch::Relauncher;
use crate::supervisor::{self, Supervisor};

/// How long the splash logo stays up before the menu appears.
pub const SPLASH_DELAY: Duration = Duration::from_millis(3300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherState {
    Splash,
    MainMenu,
    Launching(LaunchTarget),
    AwaitingRelaunch,
}

/// What the event loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub splash: Duration,
    pub settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            splash: SPLASH_DELAY,
            settle: supervisor::SETTLE_DELAY,
        }
    }
}

/// The launcher's external collaborators.
pub struct Collaborators {
    pub audio: Arc<dyn AudioBackend>,
    pub supervisor: Arc<dyn Supervisor>,
    pub relauncher: Box<dyn Relauncher>,
    pub sink: Arc<dyn DiagnosticSink>,
    pub presentation: Box<dyn Presentation>,
}

pub struct Launcher {
    state: LauncherState,
    config: LaunchConfig,
    timings: Timings,
    deps: Collaborators,
    events: mpsc::Sender<LauncherEvent>,
    theme: Option<AudioResource>,
    /// Ticket of the theme open in flight; any other theme result is stale.
    pending_theme: Option<u64>,
    one_shots: HashMap<u64, AudioResource>,
    next_ticket: u64,
    splash_epoch: u64,
}

impl Launcher {
    pub fn new(
        config: LaunchConfig,
        deps: Collaborators,
        timings: Timings,
        events: mpsc::Sender<LauncherEvent>,
    ) -> Self {
        Self {
            state: LauncherState::Splash,
            config,
            timings,
            deps,
            events,
            theme: None,
            pending_theme: None,
            one_shots: HashMap::new(),
            next_ticket: 0,
            splash_epoch: 0,
        }
    }

    pub fn state(&self) -> &LauncherState {
        &self.state
    }

    /// Number of Loop resources currently playing. Never more than one.
    pub fn playing_loops(&self) -> usize {
        self.theme
            .iter()
            .chain(self.one_shots.values())
            .filter(|r| r.mode() == AudioMode::Loop && r.is_playing())
            .count()
    }

    /// Number of resources of any mode currently playing.
    pub fn playing_resources(&self) -> usize {
        self.theme
            .iter()
            .chain(self.one_shots.values())
            .filter(|r| r.is_playing())
            .count()
    }

    /// Enters the initial Splash state. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Flow {
        self.enter(LauncherState::Splash)
    }

    pub fn handle(&mut self, event: LauncherEvent) -> Flow {
        let flow = self.dispatch(event);
        debug_assert!(self.playing_loops() <= 1);
        flow
    }

    fn dispatch(&mut self, event: LauncherEvent) -> Flow {
        match event {
            LauncherEvent::Intent(intent) => self.on_intent(intent),

            LauncherEvent::SplashElapsed { epoch } => {
                if self.state == LauncherState::Splash && epoch == self.splash_epoch {
                    self.enter(LauncherState::MainMenu)
                } else {
                    Flow::Continue
                }
            }

            LauncherEvent::AudioReady { ticket, cue, result } => {
                match result {
                    Ok(resource) => self.on_audio_ready(ticket, cue, resource),
                    Err(e) => {
                        if cue == Cue::Theme && self.pending_theme == Some(ticket) {
                            self.pending_theme = None;
                        }
                        self.deps.sink.failure(&e);
                    }
                }
                Flow::Continue
            }

            LauncherEvent::AudioFinished { ticket } => {
                if let Some(resource) = self.one_shots.remove(&ticket) {
                    debug!("Finished {}", resource.source_id());
                    resource.release();
                }
                Flow::Continue
            }

            LauncherEvent::LaunchFinished(outcome) => {
                if matches!(self.state, LauncherState::Launching(_)) {
                    info!("Launch finished: {outcome:?}");
                    self.enter(LauncherState::AwaitingRelaunch)
                } else {
                    warn!("Ignoring launch result outside Launching: {outcome:?}");
                    Flow::Continue
                }
            }

            LauncherEvent::Shutdown => {
                info!("Shutting down");
                self.stop_all_audio();
                Flow::Exit(0)
            }
        }
    }

    fn on_intent(&mut self, intent: Intent) -> Flow {
        if self.state != LauncherState::MainMenu {
            debug!("Ignoring {intent:?} in {:?}", self.state);
            return Flow::Continue;
        }
        match intent {
            Intent::Select(id) => {
                let target = self.config.target(id);
                if target.is_configured() {
                    self.enter(LauncherState::Launching(target))
                } else {
                    self.deps.sink.failure(&LaunchError::Unconfigured(id));
                    self.enter(LauncherState::AwaitingRelaunch)
                }
            }
            Intent::Hover(button) => {
                debug!("Hover {button:?}");
                self.request_audio(Cue::Hover);
                Flow::Continue
            }
            Intent::Exit => {
                info!("Exit requested");
                self.stop_all_audio();
                Flow::Exit(0)
            }
        }
    }

    fn enter(&mut self, state: LauncherState) -> Flow {
        debug!("{:?} -> {state:?}", self.state);
        self.state = state.clone();
        let targets = self.config.targets();

        match state {
            LauncherState::Splash => {
                self.splash_epoch += 1;
                self.deps.presentation.show(&self.state, &targets);
                self.request_audio(Cue::Intro);

                let epoch = self.splash_epoch;
                let delay = self.timings.splash;
                let tx = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(LauncherEvent::SplashElapsed { epoch }).await;
                });
                Flow::Continue
            }

            LauncherState::MainMenu => {
                self.stop_theme();
                self.deps.presentation.show(&self.state, &targets);
                self.pending_theme = Some(self.request_audio(Cue::Theme));
                Flow::Continue
            }

            LauncherState::Launching(target) => {
                // Audio must be fully released before the child can claim the device.
                self.stop_all_audio();
                debug_assert_eq!(self.playing_resources(), 0);
                self.deps.presentation.show(&self.state, &targets);
                info!("Launching {} from {}", target.id, target.path);

                let sup = Arc::clone(&self.deps.supervisor);
                let sink = Arc::clone(&self.deps.sink);
                let settle = self.timings.settle;
                let tx = self.events.clone();
                tokio::spawn(async move {
                    let outcome = supervisor::supervise(sup, sink, target.path, settle).await;
                    let _ = tx.send(LauncherEvent::LaunchFinished(outcome)).await;
                });
                Flow::Continue
            }

            LauncherState::AwaitingRelaunch => {
                self.stop_all_audio();
                self.deps.presentation.show(&self.state, &targets);
                match self.deps.relauncher.relaunch() {
                    Ok(()) => Flow::Exit(0),
                    Err(e) => {
                        self.deps.sink.failure(&e);
                        warn!("Restarting in-process");
                        self.deps.presentation.tear_down();
                        self.enter(LauncherState::Splash)
                    }
                }
            }
        }
    }

    /// Opens the cue's source on the blocking pool; the result comes back as
    /// `AudioReady` with the returned ticket.
    fn request_audio(&mut self, cue: Cue) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let (source_id, mode) = match cue {
            Cue::Intro => (INTRO_SOURCE, AudioMode::OneShot),
            Cue::Theme => (THEME_SOURCE, AudioMode::Loop),
            Cue::Hover => (HOVER_SOURCE, AudioMode::OneShot),
        };

        let backend = Arc::clone(&self.deps.audio);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                AudioResource::open(backend.as_ref(), source_id, mode)
            })
            .await
            .unwrap_or_else(|e| {
                Err(LaunchError::ResourceUnavailable {
                    source_id: source_id.to_string(),
                    reason: format!("open task failed: {e}"),
                })
            });
            let _ = tx.send(LauncherEvent::AudioReady { ticket, cue, result }).await;
        });
        ticket
    }

    fn on_audio_ready(&mut self, ticket: u64, cue: Cue, mut resource: AudioResource) {
        match cue {
            Cue::Theme => {
                if self.pending_theme != Some(ticket) || self.state != LauncherState::MainMenu {
                    debug!("Releasing stale theme open #{ticket}");
                    resource.release();
                    return;
                }
                self.pending_theme = None;
                self.stop_theme();
                match resource.start() {
                    Ok(_) => {
                        self.deps.presentation.now_playing(Some(resource.source_id()));
                        self.theme = Some(resource);
                    }
                    Err(e) => self.deps.sink.failure(&e),
                }
            }

            Cue::Intro | Cue::Hover => {
                if !matches!(self.state, LauncherState::Splash | LauncherState::MainMenu) {
                    resource.release();
                    return;
                }
                match resource.start() {
                    Ok(done) => {
                        let tx = self.events.clone();
                        tokio::spawn(async move {
                            // An error means the resource was stopped early.
                            if done.await.is_ok() {
                                let _ = tx.send(LauncherEvent::AudioFinished { ticket }).await;
                            }
                        });
                        self.one_shots.insert(ticket, resource);
                    }
                    Err(e) => self.deps.sink.failure(&e),
                }
            }
        }
    }

    fn stop_theme(&mut self) {
        if let Some(theme) = self.theme.take() {
            theme.release();
            self.deps.presentation.now_playing(None);
        }
    }

    fn stop_all_audio(&mut self) {
        self.stop_theme();
        self.pending_theme = None;
        for (_, resource) in self.one_shots.drain() {
            resource.release();
        }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        self.stop_all_audio();
    }
}
