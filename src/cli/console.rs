//! Console presentation
//!
//! Colored step-by-step progress, transient notes of the modem dialogue and
//! a small spinner while waiting for answers.

use crate::core::engine::{EngineEvent, EventHook};
use crate::core::handshake::{Aborted, Delivery, Step, StepObserver, StepOutcome};
use crate::core::transcript::{printable, Transcript, TranscriptEntry};
use crossterm::cursor::{RestorePosition, SavePosition};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::queue;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;

const SPINNER_FRAMES: [char; 4] = ['\\', '|', '/', '-'];

/// Silent ticks before the spinner shows up
const SPINNER_DELAY: u32 = 2;

/// Spinner character for the `tick`-th silent read of a listen
pub fn spinner_frame(tick: u32) -> Option<char> {
    if tick < SPINNER_DELAY {
        return None;
    }
    Some(SPINNER_FRAMES[((tick - 1) % 4) as usize])
}

/// Terminal output for one run
#[derive(Debug, Clone, Copy)]
pub struct Console {
    color: bool,
}

impl Console {
    /// Create a console; without color there are no transient notes either
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colors only when asked for and stdout is a terminal
    pub fn detect(color: bool) -> Self {
        Self::new(color && atty::is(atty::Stream::Stdout))
    }

    /// Whether styled output is enabled
    pub fn color(&self) -> bool {
        self.color
    }

    /// Write `what` in place without moving the cursor
    pub fn note(&self, what: &str) {
        if !self.color {
            return;
        }
        let mut out = io::stdout().lock();
        let _ = queue!(
            out,
            SavePosition,
            Clear(ClearType::UntilNewLine),
            Print(what),
            RestorePosition
        );
        let _ = out.flush();
    }

    fn show(&self, what: &str, color: Color, newline: bool) {
        let mut out = io::stdout().lock();
        if self.color {
            let _ = queue!(
                out,
                Clear(ClearType::UntilNewLine),
                SetForegroundColor(color),
                Print(what),
                ResetColor
            );
        } else {
            let _ = write!(out, "{what}");
        }
        if newline {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    /// Recipient and message banner
    pub fn header(&self, recipient: &str, message: &str) {
        println!();
        self.show("--- telling ", Color::Magenta, false);
        self.show(recipient, Color::Green, false);
        self.show(" --------", Color::Magenta, true);
        self.show(message, Color::Green, true);
        self.show("---------------------------------\n", Color::Magenta, true);
    }

    /// Final success banner
    pub fn sent(&self) {
        self.show("\n                    Message sent.", Color::Green, true);
        self.show("---------------------------------\n", Color::Magenta, true);
    }

    /// Fatal error line
    pub fn fatal(&self, reason: &str) {
        self.show(&format!("\nFatal: {reason}"), Color::Red, true);
    }

    /// What the modem said, one entry per line
    pub fn transcript(&self, transcript: &Transcript) {
        if transcript.is_empty() {
            return;
        }
        println!("\nHere's what the modem said:");
        for entry in transcript {
            println!("  {}", entry.to_text(false));
        }
    }

    /// Progress hook for the engine: notes for the dialogue, spinner while idle
    pub fn engine_hook(self) -> EventHook {
        Arc::new(move |event: &EngineEvent<'_>| match event {
            EngineEvent::Sent(command) => self.note(&format!("> {}", printable(command))),
            EngineEvent::Received(line) => self.note(&format!("< {}", printable(line))),
            EngineEvent::Idle { tick } => {
                if let Some(frame) = spinner_frame(*tick) {
                    self.note(&frame.to_string());
                }
            }
        })
    }
}

impl StepObserver for Console {
    fn step_started(&mut self, step: Step) {
        self.show(&format!("{} ... ", step.label()), Color::Magenta, false);
    }

    fn step_finished(&mut self, _step: Step, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Ok => self.show("Ok", Color::Green, true),
            StepOutcome::Fixed => self.show("Fixed", Color::Yellow, true),
            StepOutcome::Failed => self.show("Failed", Color::Red, true),
        }
    }
}

/// Machine-readable summary of a run
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// Whether the modem acknowledged the message
    pub sent: bool,
    /// Fully qualified recipient
    pub recipient: &'a str,
    /// Liveness outcome, when the run got that far
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<StepOutcome>,
    /// Step that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full dialogue
    pub transcript: &'a [TranscriptEntry],
}

impl<'a> RunReport<'a> {
    /// Report for a completed run
    pub fn delivered(recipient: &'a str, delivery: &'a Delivery) -> Self {
        Self {
            sent: true,
            recipient,
            liveness: Some(delivery.liveness),
            failed_step: None,
            error: None,
            transcript: delivery.transcript.entries(),
        }
    }

    /// Report for a stopped run
    pub fn aborted(recipient: &'a str, aborted: &'a Aborted) -> Self {
        Self {
            sent: false,
            recipient,
            liveness: None,
            failed_step: aborted.reason.step(),
            error: Some(aborted.reason.to_string()),
            transcript: aborted.transcript.entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handshake::SmsError;

    #[test]
    fn test_spinner_frames() {
        assert_eq!(spinner_frame(0), None);
        assert_eq!(spinner_frame(1), None);
        assert_eq!(spinner_frame(2), Some('|'));
        assert_eq!(spinner_frame(3), Some('/'));
        assert_eq!(spinner_frame(4), Some('-'));
        assert_eq!(spinner_frame(5), Some('\\'));
        assert_eq!(spinner_frame(6), Some('|'));
    }

    #[test]
    fn test_report_for_aborted_run() {
        let mut transcript = Transcript::new();
        transcript.log_outgoing("AT");
        let aborted = Aborted {
            reason: SmsError::StepFailed(Step::Liveness),
            transcript,
        };

        let json = serde_json::to_value(RunReport::aborted("+48123456789", &aborted)).unwrap();
        assert_eq!(json["sent"], false);
        assert_eq!(json["failed_step"], "liveness");
        assert_eq!(json["error"], "Your modem does not seem to be working");
        assert_eq!(json["transcript"][0]["text"], "AT");
        assert!(json.get("liveness").is_none());
    }

    #[test]
    fn test_report_for_delivery() {
        let delivery = Delivery {
            liveness: StepOutcome::Fixed,
            transcript: Transcript::new(),
        };

        let json = serde_json::to_value(RunReport::delivered("+48123456789", &delivery)).unwrap();
        assert_eq!(json["sent"], true);
        assert_eq!(json["liveness"], "fixed");
        assert!(json.get("failed_step").is_none());
    }
}
