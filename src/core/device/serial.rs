//! Serial character device implementation

use super::termios::{RawModeFile, DEFAULT_READ_TIMEOUT_DS};
use super::{DeviceError, LineReader, ModemDevice};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;

/// A modem behind a serial character special file (e.g. `/dev/ttyUSB0`)
#[derive(Debug, Clone)]
pub struct SerialDevice {
    path: String,
    read_timeout_ds: u8,
}

impl SerialDevice {
    /// Create a device for `path` with the default inter-byte timeout
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            read_timeout_ds: DEFAULT_READ_TIMEOUT_DS,
        }
    }

    /// Set the inter-byte read timeout in deciseconds
    #[must_use]
    pub fn read_timeout_ds(mut self, deciseconds: u8) -> Self {
        self.read_timeout_ds = deciseconds.max(1);
        self
    }
}

impl ModemDevice for SerialDevice {
    fn write_frame(&self, frame: &[u8]) -> Result<(), DeviceError> {
        let mut file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.path)
            .map_err(|e| DeviceError::from_open(&self.path, e))?;

        file.write_all(frame)?;
        file.flush()?;
        Ok(())
    }

    fn open_reader(&self) -> Result<Box<dyn LineReader>, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.path)
            .map_err(|e| DeviceError::from_open(&self.path, e))?;

        let raw = RawModeFile::new(file, self.read_timeout_ds)?;
        Ok(Box::new(SerialLineReader {
            inner: BufReader::new(raw),
        }))
    }

    fn describe(&self) -> String {
        format!("{} (read timeout {} ms)", self.path, u32::from(self.read_timeout_ds) * 100)
    }
}

/// Line reader over a raw-mode serial handle
pub struct SerialLineReader {
    inner: BufReader<RawModeFile>,
}

impl LineReader for SerialLineReader {
    fn read_line(&mut self) -> Result<String, DeviceError> {
        let mut buf = Vec::new();
        self.inner.read_until(b'\n', &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::DEFAULT_DEVICE;

    #[test]
    fn test_missing_device_is_not_found() {
        let device = SerialDevice::new("/dev/does-not-exist-atsms");
        assert!(matches!(device.write_frame(b"AT\r\n"), Err(DeviceError::NotFound(_))));
        assert!(matches!(device.open_reader(), Err(DeviceError::NotFound(_))));
    }

    #[test]
    fn test_regular_file_cannot_be_armed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let device = SerialDevice::new(file.path().to_str().unwrap());
        assert!(matches!(device.open_reader(), Err(DeviceError::Termios(_))));
    }

    #[test]
    fn test_write_frame_to_regular_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let device = SerialDevice::new(file.path().to_str().unwrap());
        device.write_frame(b"AT\r\n").unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), b"AT\r\n");
    }

    #[test]
    fn test_read_timeout_is_at_least_one() {
        let device = SerialDevice::new(DEFAULT_DEVICE).read_timeout_ds(0);
        assert_eq!(device.read_timeout_ds, 1);
        assert!(device.describe().contains("100 ms"));
    }
}
