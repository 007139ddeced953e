//! # atsms Core Library
//!
//! Sends a text message through an AT-compatible GSM modem attached to a
//! serial character device.
//!
//! ## Features
//!
//! - Raw-mode serial reads with an inter-byte timeout, restored on every exit
//! - Command/response correlation with a per-command deadline
//! - Full transcript of the modem dialogue for diagnostics
//! - Text-mode SMS handshake with one built-in recovery path
//! - Virtual modem for dry runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atsms_core::{AtEngine, Handshake, SerialDevice, Sms};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = Arc::new(SerialDevice::new("/dev/ttyUSB0"));
//!     let handshake = Handshake::new(AtEngine::new(device));
//!
//!     match handshake.send_sms(&Sms::new("+48123456789", "Hello"), &mut ()).await {
//!         Ok(_) => println!("Message sent."),
//!         Err(aborted) => {
//!             eprintln!("Fatal: {}", aborted);
//!             print!("{}", aborted.transcript.export(false));
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, TimingConfig};
pub use crate::core::device::{DeviceError, LineReader, ModemDevice, DEFAULT_DEVICE};
#[cfg(unix)]
pub use crate::core::device::SerialDevice;
pub use crate::core::engine::{AtEngine, EngineConfig, EngineEvent, EventHook};
pub use crate::core::handshake::{
    Aborted, Delivery, Handshake, Sms, SmsError, Step, StepObserver, StepOutcome,
};
pub use crate::core::simulator::{Reply, VirtualModem};
pub use crate::core::transcript::{Direction, Transcript, TranscriptEntry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
