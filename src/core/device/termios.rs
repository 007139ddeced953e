//! Raw-mode configuration of a read descriptor
//!
//! Puts a terminal descriptor into a mode where `read` returns after a line
//! terminator or after a fixed inter-byte silence, never blocks forever and
//! does no local echo or canonical processing.

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

/// Inter-byte timeout used when nothing else is configured, in deciseconds
pub const DEFAULT_READ_TIMEOUT_DS: u8 = 5;

/// Descriptor state captured before reconfiguration
#[derive(Debug, Clone)]
pub struct SavedSettings {
    /// File status flags as returned by `F_GETFL`
    pub flags: OFlag,
    /// Terminal attributes
    pub termios: Termios,
}

/// Switch `fd` to blocking, non-canonical, no-echo reads with `VMIN = 0`
/// and `VTIME = read_timeout_ds`.
///
/// Returns the previous settings, which must be handed to [`restore`].
pub fn configure(fd: BorrowedFd<'_>, read_timeout_ds: u8) -> Result<SavedSettings, nix::Error> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    let termios = tcgetattr(fd)?;

    let mut raw_mode = termios.clone();
    raw_mode.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
    raw_mode.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    raw_mode.control_chars[SpecialCharacterIndices::VTIME as usize] = read_timeout_ds;

    fcntl(raw, FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
    if let Err(e) = tcsetattr(fd, SetArg::TCSAFLUSH, &raw_mode) {
        // Undo the half-applied change before reporting.
        let _ = fcntl(raw, FcntlArg::F_SETFL(flags));
        return Err(e);
    }

    Ok(SavedSettings { flags, termios })
}

/// Reapply descriptor flags and terminal attributes saved by [`configure`]
pub fn restore(fd: BorrowedFd<'_>, saved: &SavedSettings) -> Result<(), nix::Error> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(saved.flags))?;
    tcsetattr(fd, SetArg::TCSAFLUSH, &saved.termios)
}

/// A read-only file held in raw mode.
///
/// The prior settings are restored exactly once, when the value is dropped,
/// whichever way the owning scope is left.
#[derive(Debug)]
pub struct RawModeFile {
    file: File,
    saved: Option<SavedSettings>,
}

impl RawModeFile {
    /// Configure `file` and take ownership of it
    pub fn new(file: File, read_timeout_ds: u8) -> Result<Self, nix::Error> {
        let saved = configure(file.as_fd(), read_timeout_ds)?;
        Ok(Self { file, saved: Some(saved) })
    }

    /// Settings that will be restored on drop
    pub fn saved(&self) -> Option<&SavedSettings> {
        self.saved.as_ref()
    }
}

impl Read for RawModeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl AsFd for RawModeFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl Drop for RawModeFile {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            if let Err(e) = restore(self.file.as_fd(), &saved) {
                tracing::warn!("Failed to restore terminal settings: {}", e);
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt, PtyMaster};
    use std::fs::OpenOptions;

    fn open_pty() -> (PtyMaster, String) {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).unwrap();
        grantpt(&master).unwrap();
        unlockpt(&master).unwrap();
        let name = ptsname_r(&master).unwrap();
        (master, name)
    }

    fn snapshot(fd: BorrowedFd<'_>) -> (OFlag, Termios) {
        let flags = OFlag::from_bits_truncate(fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).unwrap());
        (flags, tcgetattr(fd).unwrap())
    }

    fn same_termios(a: &Termios, b: &Termios) -> bool {
        a.input_flags == b.input_flags
            && a.output_flags == b.output_flags
            && a.control_flags == b.control_flags
            && a.local_flags == b.local_flags
            && a.control_chars == b.control_chars
    }

    #[test]
    fn test_configure_sets_raw_mode() {
        let (_master, name) = open_pty();
        let file = OpenOptions::new().read(true).open(&name).unwrap();
        let fd = file.as_fd();
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();

        let saved = configure(fd, 7).unwrap();
        assert!(saved.flags.contains(OFlag::O_NONBLOCK));

        let (flags, termios) = snapshot(fd);
        assert!(!flags.contains(OFlag::O_NONBLOCK));
        assert!(!termios.local_flags.contains(LocalFlags::ICANON));
        assert!(!termios.local_flags.contains(LocalFlags::ECHO));
        assert_eq!(termios.control_chars[SpecialCharacterIndices::VMIN as usize], 0);
        assert_eq!(termios.control_chars[SpecialCharacterIndices::VTIME as usize], 7);

        restore(fd, &saved).unwrap();
    }

    #[test]
    fn test_configure_then_restore_is_identity() {
        let (_master, name) = open_pty();
        let file = OpenOptions::new().read(true).open(&name).unwrap();
        let fd = file.as_fd();
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();

        let (flags_before, termios_before) = snapshot(fd);
        let saved = configure(fd, DEFAULT_READ_TIMEOUT_DS).unwrap();
        restore(fd, &saved).unwrap();
        let (flags_after, termios_after) = snapshot(fd);

        assert_eq!(flags_before, flags_after);
        assert!(same_termios(&termios_before, &termios_after));
    }

    #[test]
    fn test_raw_mode_file_restores_on_drop() {
        let (_master, name) = open_pty();
        // A second handle on the same terminal observes the shared attributes.
        let observer = OpenOptions::new().read(true).open(&name).unwrap();
        let before = tcgetattr(observer.as_fd()).unwrap();

        let file = OpenOptions::new().read(true).open(&name).unwrap();
        let raw = RawModeFile::new(file, DEFAULT_READ_TIMEOUT_DS).unwrap();
        assert!(raw.saved().is_some());
        let during = tcgetattr(observer.as_fd()).unwrap();
        assert!(!during.local_flags.contains(LocalFlags::ICANON));

        drop(raw);
        let after = tcgetattr(observer.as_fd()).unwrap();
        assert!(same_termios(&before, &after));
    }

    #[test]
    fn test_configure_fails_on_regular_file() {
        let file = tempfile::tempfile().unwrap();
        assert!(configure(file.as_fd(), DEFAULT_READ_TIMEOUT_DS).is_err());
    }
}
