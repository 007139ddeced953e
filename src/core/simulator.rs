//! Virtual modem simulation
//!
//! An in-process [`ModemDevice`] that answers AT frames either from a script
//! or like a healthy GSM modem. Replies only reach a reader that is armed
//! when the frame is written, the same way bytes on a real line are lost
//! when nobody listens.

use super::device::{DeviceError, LineReader, ModemDevice};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const ESC: char = '\x1b';
const SUB: char = '\x1a';

/// One scripted reaction to a written frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer with this line (CRLF is appended)
    Line(String),
    /// Say nothing
    Silence,
}

impl Reply {
    /// Shorthand for [`Reply::Line`]
    pub fn line(text: &str) -> Self {
        Self::Line(text.to_string())
    }
}

#[derive(Debug)]
enum Behaviour {
    Scripted(VecDeque<Reply>),
    Healthy { next_reference: u32, composing: bool },
}

impl Behaviour {
    fn reply_to(&mut self, command: &str) -> Reply {
        match self {
            Behaviour::Scripted(script) => script.pop_front().unwrap_or(Reply::Silence),
            Behaviour::Healthy { next_reference, composing } => {
                if *composing {
                    if command.ends_with(SUB) {
                        *composing = false;
                        let reference = *next_reference;
                        *next_reference += 1;
                        Reply::Line(format!("+CMGS: {reference}"))
                    } else {
                        Reply::line(">")
                    }
                } else if command.starts_with("AT+CMGS=") {
                    *composing = true;
                    Reply::line(">")
                } else if command == "AT"
                    || command.starts_with(ESC)
                    || command.starts_with("AT+CSCS=")
                    || command.starts_with("AT+CMGF=")
                {
                    Reply::line("OK")
                } else {
                    Reply::line("ERROR")
                }
            }
        }
    }
}

#[derive(Debug)]
struct ModemState {
    behaviour: Behaviour,
    pending: VecDeque<u8>,
    frames: Vec<String>,
    active_readers: usize,
    max_active_readers: usize,
    readers_opened: usize,
    reads: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ModemState>,
    data_ready: Condvar,
}

/// In-process modem
#[derive(Debug, Clone)]
pub struct VirtualModem {
    shared: Arc<Shared>,
    poll: Duration,
}

impl VirtualModem {
    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ModemState {
                    behaviour,
                    pending: VecDeque::new(),
                    frames: Vec::new(),
                    active_readers: 0,
                    max_active_readers: 0,
                    readers_opened: 0,
                    reads: 0,
                }),
                data_ready: Condvar::new(),
            }),
            poll: Duration::from_millis(500),
        }
    }

    /// Answer frames with `replies` in order, then stay silent
    pub fn scripted(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self::with_behaviour(Behaviour::Scripted(replies.into_iter().collect()))
    }

    /// Answer like a working modem
    pub fn healthy() -> Self {
        Self::with_behaviour(Behaviour::Healthy {
            next_reference: 1,
            composing: false,
        })
    }

    /// Set how long one silent read blocks
    #[must_use]
    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Frames written so far, without the CRLF terminator
    pub fn frames(&self) -> Vec<String> {
        self.shared.state.lock().frames.clone()
    }

    /// Number of readers opened so far
    pub fn readers_opened(&self) -> usize {
        self.shared.state.lock().readers_opened
    }

    /// Highest number of readers that were open at the same time
    pub fn max_active_readers(&self) -> usize {
        self.shared.state.lock().max_active_readers
    }

    /// Readers currently open
    pub fn active_readers(&self) -> usize {
        self.shared.state.lock().active_readers
    }

    /// Total `read_line` calls across all readers
    pub fn reads(&self) -> usize {
        self.shared.state.lock().reads
    }
}

impl ModemDevice for VirtualModem {
    fn write_frame(&self, frame: &[u8]) -> Result<(), DeviceError> {
        let text = String::from_utf8_lossy(frame);
        let command = text.strip_suffix("\r\n").unwrap_or(&text).to_string();

        let mut state = self.shared.state.lock();
        let reply = state.behaviour.reply_to(&command);
        state.frames.push(command);

        if let Reply::Line(line) = reply {
            if state.active_readers == 0 {
                tracing::warn!("Virtual modem reply {:?} dropped: no reader armed", line);
            } else {
                state.pending.extend(line.bytes());
                state.pending.extend(b"\r\n");
                self.shared.data_ready.notify_all();
            }
        }

        Ok(())
    }

    fn open_reader(&self) -> Result<Box<dyn LineReader>, DeviceError> {
        let mut state = self.shared.state.lock();
        state.readers_opened += 1;
        state.active_readers += 1;
        state.max_active_readers = state.max_active_readers.max(state.active_readers);

        Ok(Box::new(VirtualReader {
            shared: Arc::clone(&self.shared),
            poll: self.poll,
        }))
    }

    fn describe(&self) -> String {
        "virtual modem".to_string()
    }
}

struct VirtualReader {
    shared: Arc<Shared>,
    poll: Duration,
}

impl LineReader for VirtualReader {
    fn read_line(&mut self) -> Result<String, DeviceError> {
        let mut state = self.shared.state.lock();
        state.reads += 1;

        if state.pending.is_empty() {
            let _ = self.shared.data_ready.wait_for(&mut state, self.poll);
        }

        let mut line = Vec::new();
        while let Some(byte) = state.pending.pop_front() {
            line.push(byte);
            if byte == b'\n' {
                break;
            }
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Drop for VirtualReader {
    fn drop(&mut self) {
        self.shared.state.lock().active_readers -= 1;
    }
}
