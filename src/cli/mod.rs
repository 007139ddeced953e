//! CLI Module
//!
//! Command-line surface of `atsms`:
//! - Exit codes for automation
//! - Phone number and message validation
//! - Console rendering of the handshake

pub mod console;
pub mod exit_codes;
pub mod validation;

pub use console::{spinner_frame, Console, RunReport};
pub use exit_codes::{CliResult, ExitCodes};
pub use validation::{compose_message, normalize_phone_number, ValidationError};

use clap::ValueEnum;

/// Final report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored progress and a human-readable summary
    #[default]
    Text,
    /// A single JSON object on stdout
    Json,
}
