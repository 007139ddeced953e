//! Core module containing the modem protocol
//!
//! This module provides:
//! - Device layer (serial character devices, raw-mode terminal handling)
//! - AT command/response engine with arm-then-send correlation
//! - Transcript of the modem dialogue
//! - SMS handshake sequencer
//! - Virtual modem for tests and dry runs

pub mod device;
pub mod engine;
pub mod handshake;
pub mod simulator;
pub mod transcript;
