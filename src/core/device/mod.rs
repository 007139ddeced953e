//! Device layer for the modem line
//!
//! Supports:
//! - Serial character devices (USB-serial GSM modems)
//! - In-process virtual modems for tests and dry runs

#[cfg(unix)]
mod serial;
#[cfg(unix)]
pub mod termios;

#[cfg(unix)]
pub use serial::{SerialDevice, SerialLineReader};

use thiserror::Error;

/// Conventional location of the first USB-serial adapter
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Device error types
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device file does not exist
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Device exists but cannot be opened by this user
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal attributes could not be read or applied
    #[cfg(unix)]
    #[error("Cannot configure terminal: {0}")]
    Termios(#[from] nix::Error),
}

impl DeviceError {
    /// Map an error from opening `path` to the most specific variant
    pub fn from_open(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// A modem reachable through independent write and read handles.
///
/// Implementations open a fresh handle for every call and close it before
/// returning (writes) or when the reader is dropped (reads).
pub trait ModemDevice: Send + Sync {
    /// Write one complete frame through a freshly opened write-only handle
    fn write_frame(&self, frame: &[u8]) -> Result<(), DeviceError>;

    /// Open a read handle configured for line reads with an inter-byte timeout
    fn open_reader(&self) -> Result<Box<dyn LineReader>, DeviceError>;

    /// Human-readable description of the device
    fn describe(&self) -> String;
}

/// Reads one line at a time from an armed device.
///
/// Dropping the reader releases the handle and undoes any configuration
/// applied by [`ModemDevice::open_reader`].
pub trait LineReader: Send {
    /// Read up to and including the next line terminator.
    ///
    /// Returns whatever arrived before the inter-byte timeout expired, which
    /// is an empty string when the line stayed silent.
    fn read_line(&mut self) -> Result<String, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_open_maps_kinds() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(
            DeviceError::from_open("/dev/ttyUSB9", err),
            DeviceError::NotFound(ref p) if p == "/dev/ttyUSB9"
        ));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            DeviceError::from_open("/dev/ttyUSB0", err),
            DeviceError::PermissionDenied(_)
        ));

        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(DeviceError::from_open("/dev/ttyUSB0", err), DeviceError::Io(_)));
    }
}
