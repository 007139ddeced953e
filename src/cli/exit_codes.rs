//! CLI Exit Codes
//!
//! Exit codes for scripting around `atsms`.

use crate::core::handshake::{Aborted, SmsError};
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Message sent
    pub const SUCCESS: u8 = 0;

    /// The modem refused a step, or the input was rejected
    pub const HANDSHAKE_FAILED: u8 = 1;

    /// Device, configuration or usage error
    pub const ERROR: u8 = 2;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Rejected phone number or message
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::HANDSHAKE_FAILED, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl From<&Aborted> for CliResult {
    fn from(aborted: &Aborted) -> Self {
        let code = match aborted.reason {
            SmsError::StepFailed(_) => ExitCodes::HANDSHAKE_FAILED,
            SmsError::Device(_) => ExitCodes::ERROR,
        };
        Self::Error(code, aborted.reason.to_string())
    }
}
