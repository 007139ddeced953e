//! AT command/response engine
//!
//! Correlates one outgoing command with the first line the modem answers,
//! under a deadline counted in read ticks. Listening is armed on a blocking
//! task before the command is written, so a fast reply cannot slip past.

use super::device::{DeviceError, ModemDevice};
use super::transcript::{Direction, Transcript, TranscriptEntry};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Command terminator
pub const CRLF: &str = "\r\n";

/// Engine timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long to wait for a response to one command
    pub command_timeout: Duration,
    /// Pause between arming the reader and writing the command
    pub arm_delay: Duration,
    /// Inter-byte read timeout in deciseconds; one read tick lasts this long
    pub read_timeout_ds: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            arm_delay: Duration::from_secs(1),
            read_timeout_ds: 5,
        }
    }
}

impl EngineConfig {
    /// Number of silent reads that make up `timeout`, rounded up
    pub fn ticks_for(&self, timeout: Duration) -> u32 {
        let tick_ms = u128::from(self.read_timeout_ds.max(1)) * 100;
        u32::try_from(timeout.as_millis().div_ceil(tick_ms)).unwrap_or(u32::MAX)
    }
}

/// Progress notifications; carry no protocol meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent<'a> {
    /// A command was handed to the device
    Sent(&'a str),
    /// A response line was received
    Received(&'a str),
    /// A read tick passed without a usable line
    Idle {
        /// Zero-based tick index within the current listen
        tick: u32,
    },
}

/// Callback receiving [`EngineEvent`]s, possibly from a blocking thread
pub type EventHook = Arc<dyn Fn(&EngineEvent<'_>) + Send + Sync>;

/// A line heard by the listener, stamped when it arrived
#[derive(Debug)]
struct Heard {
    line: String,
    at: DateTime<Local>,
}

/// Half-duplex AT command engine over one device
pub struct AtEngine {
    device: Arc<dyn ModemDevice>,
    config: EngineConfig,
    transcript: Transcript,
    hook: Option<EventHook>,
}

impl AtEngine {
    /// Create an engine with default timing
    pub fn new(device: Arc<dyn ModemDevice>) -> Self {
        Self::with_config(device, EngineConfig::default())
    }

    /// Create an engine with custom timing
    pub fn with_config(device: Arc<dyn ModemDevice>, config: EngineConfig) -> Self {
        Self {
            device,
            config,
            transcript: Transcript::new(),
            hook: None,
        }
    }

    /// Install a progress hook
    pub fn set_event_hook(&mut self, hook: EventHook) {
        self.hook = Some(hook);
    }

    /// Engine timing
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Everything sent and received so far
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Give up the engine, keeping its transcript
    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    /// Write `command` followed by CRLF through a fresh write handle
    pub async fn send(&mut self, command: &str) -> Result<(), DeviceError> {
        self.transcript.log_outgoing(command);
        debug!(command = %command.escape_debug(), "sending");
        self.emit(&EngineEvent::Sent(command));

        let device = Arc::clone(&self.device);
        let frame = format!("{command}{CRLF}").into_bytes();
        tokio::task::spawn_blocking(move || device.write_frame(&frame))
            .await
            .map_err(join_error)?
    }

    /// Wait up to `timeout` for the next non-empty line
    pub async fn listen(&mut self, timeout: Duration) -> Result<Option<String>, DeviceError> {
        let task = self.spawn_listener(timeout);
        self.collect(task).await
    }

    /// Send `command` and return the first response line, using the
    /// configured command timeout
    pub async fn issue_command(&mut self, command: &str) -> Result<Option<String>, DeviceError> {
        let timeout = self.config.command_timeout;
        self.issue_command_with_timeout(command, timeout).await
    }

    /// Arm a listener, wait for it to settle, send `command`, then await
    /// the listener's result
    pub async fn issue_command_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<Option<String>, DeviceError> {
        let task = self.spawn_listener(timeout);
        tokio::time::sleep(self.config.arm_delay).await;

        if let Err(e) = self.send(command).await {
            // The listener ends on its own once its ticks run out.
            let _ = task.await;
            return Err(e);
        }

        self.collect(task).await
    }

    fn spawn_listener(&self, timeout: Duration) -> JoinHandle<Result<Option<Heard>, DeviceError>> {
        let device = Arc::clone(&self.device);
        let hook = self.hook.clone();
        let ticks = self.config.ticks_for(timeout);
        tokio::task::spawn_blocking(move || listen_blocking(device.as_ref(), ticks, hook.as_ref()))
    }

    async fn collect(
        &mut self,
        task: JoinHandle<Result<Option<Heard>, DeviceError>>,
    ) -> Result<Option<String>, DeviceError> {
        match task.await.map_err(join_error)?? {
            Some(heard) => {
                debug!(line = %heard.line, "received");
                self.transcript
                    .push(TranscriptEntry::at(Direction::Incoming, &heard.line, heard.at));
                self.emit(&EngineEvent::Received(&heard.line));
                Ok(Some(heard.line))
            }
            None => {
                debug!("no response");
                Ok(None)
            }
        }
    }

    fn emit(&self, event: &EngineEvent<'_>) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }
}

fn listen_blocking(
    device: &dyn ModemDevice,
    ticks: u32,
    hook: Option<&EventHook>,
) -> Result<Option<Heard>, DeviceError> {
    let mut reader = device.open_reader()?;

    for tick in 0..ticks {
        let raw = reader.read_line()?;
        let line = raw.trim();
        if !line.is_empty() {
            return Ok(Some(Heard {
                line: line.to_string(),
                at: Local::now(),
            }));
        }

        trace!(tick, "idle");
        if let Some(hook) = hook {
            hook(&EngineEvent::Idle { tick });
        }
    }

    Ok(None)
}

fn join_error(e: tokio::task::JoinError) -> DeviceError {
    DeviceError::Io(std::io::Error::other(e))
}
