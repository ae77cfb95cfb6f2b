use crate::audio::AudioResource;
use crate::config::TargetId;
use crate::error::LaunchError;
use crate::supervisor::LaunchOutcome;

/// Menu buttons the pointer can hover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Target(TargetId),
    Exit,
}

/// User intents reported by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Select(TargetId),
    Hover(Button),
    Exit,
}

/// Which sound an audio request was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Intro,
    Theme,
    Hover,
}

/// Everything the control thread reacts to, in arrival order.
pub enum LauncherEvent {
    Intent(Intent),
    /// The splash presentation delay of the given Splash entry ran out.
    SplashElapsed { epoch: u64 },
    /// A background open finished; the resource is not started yet.
    AudioReady {
        ticket: u64,
        cue: Cue,
        result: Result<AudioResource, LaunchError>,
    },
    /// A one-shot resource played to the end.
    AudioFinished { ticket: u64 },
    /// The supervisor finished, settle delay included.
    LaunchFinished(LaunchOutcome),
    /// Ctrl+C received; stop audio and exit without relaunching.
    Shutdown,
}
