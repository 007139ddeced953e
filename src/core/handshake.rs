//! SMS handshake sequencer
//!
//! Walks a fixed list of steps (liveness, charset, text mode, receiver,
//! content, termination). Each step issues one or more commands through the
//! [`AtEngine`] and checks the response against a step-specific predicate.
//! The first failing step stops the run.

use super::device::DeviceError;
use super::engine::AtEngine;
use super::transcript::Transcript;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;

/// Interrupts whatever the modem is doing
pub const ESC: &str = "\x1b";
/// Terminates message content (Ctrl-Z)
pub const SUB: &str = "\x1a";

/// Answers that count as a successful interrupt
const ABORT_ACCEPTED: [&str; 2] = ["OK", "+CMS ERROR: 305"];

fn submit_ack() -> &'static Regex {
    static ACK: OnceLock<Regex> = OnceLock::new();
    ACK.get_or_init(|| Regex::new(r"^\+CMGS:\s*\d*").expect("valid acknowledgment pattern"))
}

/// One step of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// `AT`, with one interrupt-and-recheck recovery
    Liveness,
    /// `AT+CSCS="GSM"`
    Charset,
    /// `AT+CMGF=1`
    TextMode,
    /// `AT+CMGS="<number>"`
    Receiver,
    /// Every message line but the last
    ContentLines,
    /// Last message line followed by Ctrl-Z
    ContentTermination,
}

impl Step {
    /// Steps in the order they run
    pub const SEQUENCE: [Step; 6] = [
        Step::Liveness,
        Step::Charset,
        Step::TextMode,
        Step::Receiver,
        Step::ContentLines,
        Step::ContentTermination,
    ];

    /// What the step is doing, for progress display
    pub fn label(&self) -> &'static str {
        match self {
            Step::Liveness => "Checking modem",
            Step::Charset => "Switching modem to GSM mode",
            Step::TextMode => "Selecting text mode",
            Step::Receiver => "Setting SMS receiver",
            Step::ContentLines => "Entering message content",
            Step::ContentTermination => "Sending message",
        }
    }

    /// Why the run stopped when this step failed
    pub fn failure_message(&self) -> &'static str {
        match self {
            Step::Liveness => "Your modem does not seem to be working",
            Step::Charset => "Could not switch modem to GSM mode",
            Step::TextMode => "Could not switch modem to Text mode",
            Step::Receiver => "Could not set message receiver number",
            Step::ContentLines => "Could not enter message content",
            Step::ContentTermination => "Could not send message",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    /// Passed on the first try
    Ok,
    /// Passed after recovery
    Fixed,
    /// Did not pass
    Failed,
}

impl StepOutcome {
    /// True for `Ok` and `Fixed`
    pub fn is_success(&self) -> bool {
        !matches!(self, StepOutcome::Failed)
    }

    fn from_bool(passed: bool) -> Self {
        if passed {
            StepOutcome::Ok
        } else {
            StepOutcome::Failed
        }
    }
}

/// A message ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sms {
    /// Fully qualified number, e.g. `+48123456789`
    pub recipient: String,
    /// Message text; may span several lines
    pub message: String,
}

impl Sms {
    /// Create a message
    pub fn new(recipient: &str, message: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            message: message.to_string(),
        }
    }

    /// Split content into the leading lines and the final line.
    ///
    /// An empty message is a single empty line.
    pub fn content_lines(&self) -> (Vec<&str>, &str) {
        let mut lines: Vec<&str> = self.message.lines().collect();
        let last = lines.pop().unwrap_or("");
        (lines, last)
    }
}

/// Why a run stopped
#[derive(Error, Debug)]
pub enum SmsError {
    /// The device failed; never retried
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A step got no answer or the wrong one
    #[error("{}", .0.failure_message())]
    StepFailed(Step),
}

impl SmsError {
    /// The failing step, for protocol failures
    pub fn step(&self) -> Option<Step> {
        match self {
            SmsError::StepFailed(step) => Some(*step),
            SmsError::Device(_) => None,
        }
    }
}

/// A stopped run together with everything the modem said
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct Aborted {
    /// What went wrong
    pub reason: SmsError,
    /// Dialogue up to the failure
    pub transcript: Transcript,
}

/// A completed run
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Whether the modem needed recovery before it answered
    pub liveness: StepOutcome,
    /// Full dialogue
    pub transcript: Transcript,
}

/// Receives progress of [`Handshake::send_sms`]
pub trait StepObserver {
    /// A step is about to run
    fn step_started(&mut self, _step: Step) {}

    /// A step finished with `outcome`
    fn step_finished(&mut self, _step: Step, _outcome: StepOutcome) {}
}

impl StepObserver for () {}

/// The SMS handshake over one engine
pub struct Handshake {
    engine: AtEngine,
}

impl Handshake {
    /// Create a sequencer driving `engine`
    pub fn new(engine: AtEngine) -> Self {
        Self { engine }
    }

    /// Dialogue so far
    pub fn transcript(&self) -> &Transcript {
        self.engine.transcript()
    }

    /// Give up the sequencer, keeping its dialogue
    pub fn into_transcript(self) -> Transcript {
        self.engine.into_transcript()
    }

    async fn expect(&mut self, command: &str, accepted: &[&str]) -> Result<bool, DeviceError> {
        let response = self.engine.issue_command(command).await?;
        Ok(response.is_some_and(|r| accepted.contains(&r.as_str())))
    }

    async fn at(&mut self) -> Result<bool, DeviceError> {
        self.expect("AT", &["OK"]).await
    }

    /// Interrupt the modem with ESC
    pub async fn abort(&mut self) -> Result<bool, DeviceError> {
        self.expect(ESC, &ABORT_ACCEPTED).await
    }

    /// `AT`; on failure interrupt and try once more
    pub async fn check_liveness(&mut self) -> Result<StepOutcome, DeviceError> {
        if self.at().await? {
            return Ok(StepOutcome::Ok);
        }

        info!("Modem did not answer AT, interrupting");
        if self.abort().await? && self.at().await? {
            Ok(StepOutcome::Fixed)
        } else {
            Ok(StepOutcome::Failed)
        }
    }

    /// Select the GSM character set
    pub async fn select_charset(&mut self) -> Result<StepOutcome, DeviceError> {
        Ok(StepOutcome::from_bool(self.expect("AT+CSCS=\"GSM\"", &["OK"]).await?))
    }

    /// Switch to text mode
    pub async fn select_text_mode(&mut self) -> Result<StepOutcome, DeviceError> {
        Ok(StepOutcome::from_bool(self.expect("AT+CMGF=1", &["OK"]).await?))
    }

    /// Open a message to `recipient`; the modem prompts with `>`
    pub async fn select_receiver(&mut self, recipient: &str) -> Result<StepOutcome, DeviceError> {
        let command = format!("AT+CMGS=\"{recipient}\"");
        Ok(StepOutcome::from_bool(self.expect(&command, &[">"]).await?))
    }

    /// Send each line, expecting a `>` continuation prompt after every one
    pub async fn enter_lines(&mut self, lines: &[&str]) -> Result<StepOutcome, DeviceError> {
        for line in lines {
            if !self.expect(line, &[">"]).await? {
                return Ok(StepOutcome::Failed);
            }
        }
        Ok(StepOutcome::Ok)
    }

    /// Send the last line with Ctrl-Z and wait for the `+CMGS:` acknowledgment
    pub async fn terminate_content(&mut self, last_line: &str) -> Result<StepOutcome, DeviceError> {
        let command = format!("{last_line}{SUB}");
        let response = self.engine.issue_command(&command).await?;
        Ok(StepOutcome::from_bool(
            response.is_some_and(|r| submit_ack().is_match(&r)),
        ))
    }

    async fn perform(&mut self, step: Step, sms: &Sms) -> Result<StepOutcome, DeviceError> {
        match step {
            Step::Liveness => self.check_liveness().await,
            Step::Charset => self.select_charset().await,
            Step::TextMode => self.select_text_mode().await,
            Step::Receiver => self.select_receiver(&sms.recipient).await,
            Step::ContentLines => self.enter_lines(&sms.content_lines().0).await,
            Step::ContentTermination => self.terminate_content(sms.content_lines().1).await,
        }
    }

    /// Run every step in order, stopping at the first failure
    pub async fn send_sms(
        mut self,
        sms: &Sms,
        observer: &mut dyn StepObserver,
    ) -> Result<Delivery, Aborted> {
        let mut liveness = StepOutcome::Ok;

        let single_line = sms.content_lines().0.is_empty();

        for step in Step::SEQUENCE {
            // A one-line message has nothing to enter before the termination.
            let reported = !(step == Step::ContentLines && single_line);
            if reported {
                observer.step_started(step);
            }
            let outcome = match self.perform(step, sms).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    return Err(Aborted {
                        reason: SmsError::Device(e),
                        transcript: self.into_transcript(),
                    })
                }
            };
            if reported {
                observer.step_finished(step, outcome);
            }
            info!(step = ?step, outcome = ?outcome, "step finished");

            if !outcome.is_success() {
                return Err(Aborted {
                    reason: SmsError::StepFailed(step),
                    transcript: self.into_transcript(),
                });
            }
            if step == Step::Liveness {
                liveness = outcome;
            }
        }

        Ok(Delivery {
            liveness,
            transcript: self.into_transcript(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_lines() {
        let sms = Sms::new("+48123456789", "Hello\nWorld");
        assert_eq!(sms.content_lines(), (vec!["Hello"], "World"));

        let sms = Sms::new("+48123456789", "Hi");
        assert_eq!(sms.content_lines(), (vec![], "Hi"));

        let sms = Sms::new("+48123456789", "one\r\ntwo\nthree");
        assert_eq!(sms.content_lines(), (vec!["one", "two"], "three"));

        let sms = Sms::new("+48123456789", "");
        assert_eq!(sms.content_lines(), (vec![], ""));
    }

    #[test]
    fn test_submit_ack_pattern() {
        assert!(submit_ack().is_match("+CMGS: 12"));
        assert!(submit_ack().is_match("+CMGS:"));
        assert!(submit_ack().is_match("+CMGS:7"));
        assert!(!submit_ack().is_match("ERROR"));
        assert!(!submit_ack().is_match("+cmgs: 1"));
        assert!(!submit_ack().is_match(" +CMGS: 1"));
    }

    #[test]
    fn test_step_sequence_order() {
        assert_eq!(Step::SEQUENCE[0], Step::Liveness);
        assert_eq!(Step::SEQUENCE[5], Step::ContentTermination);
        assert_eq!(Step::Receiver.to_string(), "Setting SMS receiver");
    }

    #[test]
    fn test_step_failed_message() {
        let err = SmsError::StepFailed(Step::Charset);
        assert_eq!(err.to_string(), "Could not switch modem to GSM mode");
        assert_eq!(err.step(), Some(Step::Charset));
    }

    #[test]
    fn test_outcome_success() {
        assert!(StepOutcome::Ok.is_success());
        assert!(StepOutcome::Fixed.is_success());
        assert!(!StepOutcome::Failed.is_success());
    }
}
