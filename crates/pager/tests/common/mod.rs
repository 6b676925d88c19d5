#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

// ---

/// Points the process stdout at a temporary file for the lifetime of the value.
pub struct Capture {
    file: NamedTempFile,
    backup: OwnedFd,
}

impl Capture {
    pub fn stdout() -> Self {
        io::stdout().flush().unwrap();
        let file = NamedTempFile::new().unwrap();
        let backup = unsafe { libc::dup(libc::STDOUT_FILENO) };
        assert_ne!(backup, -1);
        assert_ne!(unsafe { libc::dup2(file.as_file().as_raw_fd(), libc::STDOUT_FILENO) }, -1);
        Self {
            file,
            backup: unsafe { OwnedFd::from_raw_fd(backup) },
        }
    }

    pub fn contents(&self) -> String {
        io::stdout().flush().unwrap();
        fs::read_to_string(self.file.path()).unwrap()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        io::stdout().flush().ok();
        unsafe { libc::dup2(self.backup.as_raw_fd(), libc::STDOUT_FILENO) };
    }
}

// ---

/// Writes to the process stdout the way ordinary code would.
pub fn out(data: impl AsRef<[u8]>) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(data.as_ref())?;
    stdout.flush()
}

/// Polls until `f` returns `true` or `timeout` elapses.
pub fn eventually(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        sleep(Duration::from_millis(10));
    }
    f()
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

pub fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}
