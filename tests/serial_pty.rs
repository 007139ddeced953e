//! Serial device tests over a pseudo-terminal

#![cfg(target_os = "linux")]

use atsms_core::core::device::termios::RawModeFile;
use atsms_core::{
    AtEngine, DeviceError, Direction, EngineConfig, LineReader, ModemDevice, SerialDevice,
};
use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
use nix::sys::termios::{tcgetattr, LocalFlags, Termios};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn open_pty() -> (PtyMaster, String) {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
    grantpt(&master).unwrap();
    unlockpt(&master).unwrap();
    let name = ptsname_r(&master).unwrap();
    (master, name)
}

/// Holds the slave side open so the line never hangs up between operations
fn observer(name: &str) -> File {
    OpenOptions::new().read(true).write(true).open(name).unwrap()
}

fn same_termios(a: &Termios, b: &Termios) -> bool {
    a.input_flags == b.input_flags
        && a.output_flags == b.output_flags
        && a.control_flags == b.control_flags
        && a.local_flags == b.local_flags
        && a.control_chars == b.control_chars
}

fn config() -> EngineConfig {
    EngineConfig {
        command_timeout: Duration::from_secs(2),
        arm_delay: Duration::from_millis(100),
        read_timeout_ds: 1,
    }
}

/// Answer `reply` once `command` shows up on the line.
///
/// The master comes back from the thread so the line stays up until the
/// test is done with it.
fn fake_modem(
    mut master: PtyMaster,
    command: &'static str,
    reply: &'static str,
) -> thread::JoinHandle<(PtyMaster, Vec<u8>)> {
    thread::spawn(move || {
        let mut seen = Vec::new();
        let mut buf = [0u8; 64];
        while !String::from_utf8_lossy(&seen).contains(command) {
            let n = master.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        master.write_all(reply.as_bytes()).unwrap();
        master.flush().unwrap();
        (master, seen)
    })
}

#[tokio::test]
async fn test_command_round_trip() {
    let (master, name) = open_pty();
    let slave = observer(&name);
    let before = tcgetattr(slave.as_fd()).unwrap();

    let modem = fake_modem(master, "AT\r", "OK\r\n");
    let device = SerialDevice::new(&name).read_timeout_ds(1);
    let mut engine = AtEngine::with_config(Arc::new(device), config());

    let response = engine.issue_command("AT").await.unwrap();
    assert_eq!(response.as_deref(), Some("OK"));

    let transcript = engine.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript.entries()[0].direction, Direction::Outgoing);
    assert_eq!(transcript.entries()[1].text, "OK");

    let after = tcgetattr(slave.as_fd()).unwrap();
    assert!(same_termios(&before, &after));
    assert!(after.local_flags.contains(LocalFlags::ICANON));

    let (_master, seen) = modem.join().unwrap();
    assert!(String::from_utf8_lossy(&seen).starts_with("AT\r"));
}

#[tokio::test]
async fn test_timeout_restores_terminal() {
    let (_master, name) = open_pty();
    let slave = observer(&name);
    let before = tcgetattr(slave.as_fd()).unwrap();

    let device = SerialDevice::new(&name).read_timeout_ds(1);
    let mut engine = AtEngine::with_config(Arc::new(device), config());

    let response = engine.listen(Duration::from_millis(300)).await.unwrap();
    assert_eq!(response, None);

    let after = tcgetattr(slave.as_fd()).unwrap();
    assert!(same_termios(&before, &after));
}

/// Arms the line like [`SerialDevice`] but loses it on the first read
struct FlakyLine {
    path: String,
}

struct FlakyReader {
    _raw: RawModeFile,
}

impl LineReader for FlakyReader {
    fn read_line(&mut self) -> Result<String, DeviceError> {
        Err(DeviceError::Io(std::io::Error::other("line dropped")))
    }
}

impl ModemDevice for FlakyLine {
    fn write_frame(&self, _frame: &[u8]) -> Result<(), DeviceError> {
        Ok(())
    }

    fn open_reader(&self) -> Result<Box<dyn LineReader>, DeviceError> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let raw = RawModeFile::new(file, 1)?;
        Ok(Box::new(FlakyReader { _raw: raw }))
    }

    fn describe(&self) -> String {
        format!("flaky {}", self.path)
    }
}

#[tokio::test]
async fn test_read_error_restores_terminal() {
    let (_master, name) = open_pty();
    let slave = observer(&name);
    let before = tcgetattr(slave.as_fd()).unwrap();

    let mut engine = AtEngine::with_config(Arc::new(FlakyLine { path: name }), config());

    let result = engine.listen(Duration::from_millis(300)).await;
    assert!(matches!(result, Err(DeviceError::Io(_))));

    let after = tcgetattr(slave.as_fd()).unwrap();
    assert!(same_termios(&before, &after));
    assert!(after.local_flags.contains(LocalFlags::ECHO));
}
