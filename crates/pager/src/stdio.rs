//! Descriptor-level plumbing: backing up, substituting and restoring the stdout slot.

// std imports
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

// third-party imports
use lifecycle::Shutdown;

// local imports
use crate::error::{Error, Result, Shared};

const NULL_DEVICE: &str = "/dev/null";

// ---

/// A process-wide descriptor slot whose contents can be replaced in place.
///
/// Replacing the slot's contents with `dup2` makes every existing reference to
/// the slot number, including ones captured by code we do not control,
/// observe the new target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot(RawFd);

impl Slot {
    pub const STDOUT: Self = Self(libc::STDOUT_FILENO);

    #[cfg(test)]
    pub fn new(fd: RawFd) -> Self {
        Self(fd)
    }

    /// Duplicates the current contents of the slot into an independent close-on-exec descriptor.
    pub fn backup(self) -> io::Result<OwnedFd> {
        let fd = unsafe { libc::fcntl(self.0, libc::F_DUPFD_CLOEXEC, 0) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    /// Atomically replaces the contents of the slot with a duplicate of `source`.
    pub fn install(self, source: BorrowedFd<'_>) -> io::Result<()> {
        loop {
            if unsafe { libc::dup2(source.as_raw_fd(), self.0) } != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

// ---

/// Creates a unidirectional pipe, returning `(read, write)` ends, both close-on-exec.
///
/// The write end must never leak into the pager, otherwise it would not see end-of-input.
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as RawFd; 2];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd"))]
    {
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd", target_os = "netbsd")))]
    {
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        for fd in fds {
            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
                let err = io::Error::last_os_error();
                unsafe {
                    libc::close(fds[0]);
                    libc::close(fds[1]);
                }
                return Err(err);
            }
        }
    }

    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Opens the null device for writing.
pub(crate) fn discard() -> io::Result<File> {
    OpenOptions::new().write(true).open(NULL_DEVICE)
}

// ---

/// The descriptors that keep a redirected slot recoverable.
///
/// Owned by the lifecycle coordinator, which is the only party allowed to
/// touch the slot after setup.
pub(crate) struct Redirection {
    slot: Slot,
    reader: Option<OwnedFd>,
    backup: Option<OwnedFd>,
}

impl Redirection {
    /// Installs `writer` into `slot`.
    ///
    /// `reader` is retained until teardown so that writes into the slot cannot
    /// hit a broken pipe while the pager is still attaching or already gone.
    /// `backup` must hold the slot's previous contents.
    pub fn install(slot: Slot, writer: OwnedFd, reader: OwnedFd, backup: OwnedFd) -> Result<Self> {
        slot.install(writer.as_fd()).shared(Error::Redirect)?;
        // the slot holds its own duplicate now
        drop(writer);
        log::debug!("stdout redirected to pager pipe");

        Ok(Self {
            slot,
            reader: Some(reader),
            backup: Some(backup),
        })
    }
}

impl Shutdown for Redirection {
    type Error = Error;

    fn teardown(&mut self) -> Result<()> {
        let result = discard().and_then(|null| self.slot.install(null.as_fd()));
        // release writers blocked on a full pipe whose pager is gone
        self.reader.take();
        log::debug!("pager pipe closed: {result:?}");
        result.shared(Error::Teardown)
    }

    fn restore(&mut self) -> Result<()> {
        let backup = self
            .backup
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stdout backup is already consumed"))
            .shared(Error::Restore)?;
        self.slot.install(backup.as_fd()).shared(Error::Restore)?;
        log::debug!("stdout restored");
        Ok(())
    }
}
