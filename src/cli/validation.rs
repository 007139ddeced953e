//! Input validation for the command line
//!
//! Phone numbers and message text are checked here, before anything touches
//! the modem.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Longest message accepted, in characters
pub const MAX_MESSAGE_CHARS: usize = 160;

/// Country prefix added to national numbers
pub const COUNTRY_PREFIX: &str = "+48";

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"^(?:\+48)?\s?(?P<number>\d{9})$").expect("valid phone number pattern")
    })
}

/// Rejected input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Not a Polish mobile number
    #[error("Expected phone number to match polish format: +48123456789 or 123456789, got {0:?}")]
    InvalidPhoneNumber(String),

    /// Nothing to send
    #[error("The message is empty")]
    EmptyMessage,

    /// Over the single-SMS limit
    #[error("Your message is too long - it has {0} characters when the limit is {limit}", limit = MAX_MESSAGE_CHARS)]
    MessageTooLong(usize),
}

/// Accept `123456789`, `+48123456789` or `+48 123456789` and return the
/// fully qualified `+48123456789`
pub fn normalize_phone_number(input: &str) -> Result<String, ValidationError> {
    phone_pattern()
        .captures(input.trim())
        .and_then(|caps| caps.name("number"))
        .map(|number| format!("{COUNTRY_PREFIX}{}", number.as_str()))
        .ok_or_else(|| ValidationError::InvalidPhoneNumber(input.to_string()))
}

/// Join message words with single spaces and check the length
pub fn compose_message<S: AsRef<str>>(words: &[S]) -> Result<String, ValidationError> {
    let message = words
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();

    let length = message.chars().count();
    if length == 0 {
        return Err(ValidationError::EmptyMessage);
    }
    if length > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong(length));
    }

    Ok(message)
}
