/// The presentation boundary and a line-oriented console implementation.
///
/// A presentation renders whatever state the launcher is in and turns user
/// input into [`Intent`]s posted on the launcher's event queue. The console
/// version prints each screen and reads commands from stdin.
use std::io::BufRead;
use std::thread;

use log::debug;
use tokio::sync::mpsc;

use crate::config::{LaunchTarget, TargetId};
use crate::event::{Button, Intent, LauncherEvent};
use crate::launcher::LauncherState;

pub trait Presentation {
    /// Called on every state entry.
    fn show(&mut self, state: &LauncherState, targets: &[LaunchTarget; 2]);
    /// The source currently looping, for optional visualisation.
    fn now_playing(&mut self, source_id: Option<&str>);
    /// Drops everything on screen before an in-process restart.
    fn tear_down(&mut self);
}

fn button_label(id: TargetId) -> &'static str {
    match id {
        TargetId::GroundZeroes => "ACT I  : GROUND ZEROES",
        TargetId::PhantomPain => "ACT II : THE PHANTOM PAIN",
    }
}

pub struct ConsolePresentation;

impl ConsolePresentation {
    /// Starts the stdin reader; intents are posted to `tx` until stdin closes
    /// or the queue is gone.
    pub fn spawn(tx: mpsc::Sender<LauncherEvent>) -> Self {
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_intent(&line) {
                    Some(intent) => {
                        if tx.blocking_send(LauncherEvent::Intent(intent)).is_err() {
                            break;
                        }
                    }
                    None => debug!("Unrecognised input: {line:?}"),
                }
            }
        });
        Self
    }
}

impl Presentation for ConsolePresentation {
    fn show(&mut self, state: &LauncherState, targets: &[LaunchTarget; 2]) {
        match state {
            LauncherState::Splash => println!("\n  M E T A L   G E A R   S O L I D   V\n"),
            LauncherState::MainMenu => {
                println!();
                for (n, target) in targets.iter().enumerate() {
                    let note = if target.is_configured() { "" } else { "  (not configured)" };
                    println!("  [{}] {}{note}", n + 1, button_label(target.id));
                }
                println!("\n  [q] Exit\n");
            }
            LauncherState::Launching(target) => println!("  Launching {}...", target.id),
            LauncherState::AwaitingRelaunch => println!("  Restarting launcher..."),
        }
    }

    fn now_playing(&mut self, source_id: Option<&str>) {
        if let Some(id) = source_id {
            debug!("Now playing: {id}");
        }
    }

    fn tear_down(&mut self) {
        println!("\n\n");
    }
}

/// `1`/`gz`, `2`/`tpp`, `q`/`exit`, or `hover <1|2|3>`.
pub fn parse_intent(line: &str) -> Option<Intent> {
    let line = line.trim().to_ascii_lowercase();
    let mut words = line.split_whitespace();
    let first = words.next()?;
    let second = words.next();
    if words.next().is_some() {
        return None;
    }

    let button = |word: &str| match word {
        "1" | "gz" => Some(Button::Target(TargetId::GroundZeroes)),
        "2" | "tpp" => Some(Button::Target(TargetId::PhantomPain)),
        "3" | "q" | "exit" => Some(Button::Exit),
        _ => None,
    };

    match (first, second) {
        ("hover" | "h", Some(word)) => button(word).map(Intent::Hover),
        ("q" | "quit" | "exit", None) => Some(Intent::Exit),
        (word, None) => match button(word)? {
            Button::Target(id) => Some(Intent::Select(id)),
            Button::Exit => Some(Intent::Exit),
        },
        _ => None,
    }
}
