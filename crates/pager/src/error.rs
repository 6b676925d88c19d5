// std imports
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

// third-party imports
use thiserror::Error;

// ---

/// Error is an error which may occur while starting, running or waiting for a pager.
///
/// It is cheap to clone, so that the single recorded outcome of a pager can be
/// returned to every caller of [`wait`](crate::PagerHandle::wait).
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("empty pager command")]
    EmptyCommand,

    #[error("failed to install interrupt handler")]
    Signals(#[source] Arc<io::Error>),

    #[error("failed to back up stdout")]
    Backup(#[source] Arc<io::Error>),

    #[error("failed to create pager pipe")]
    Pipe(#[source] Arc<io::Error>),

    #[error("failed to redirect stdout to pager pipe")]
    Redirect(#[source] Arc<io::Error>),

    #[error("failed to start pager {command:?}")]
    Launch {
        command: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to close pager pipe")]
    Teardown(#[source] Arc<io::Error>),

    #[error("failed to restore stdout")]
    Restore(#[source] Arc<io::Error>),

    #[error("failed to wait for pager process")]
    WaitFailed(#[source] Arc<io::Error>),

    #[error("pager {command:?} exited with {status}")]
    Exited { command: String, status: ExitStatus },
}

impl Error {
    /// Returns the broad category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Signals(_) | Self::Backup(_) | Self::Pipe(_) | Self::Redirect(_) => ErrorKind::Resource,
            Self::EmptyCommand | Self::Launch { .. } => ErrorKind::Launch,
            Self::Teardown(_) => ErrorKind::Teardown,
            Self::Restore(_) => ErrorKind::Restore,
            Self::WaitFailed(_) | Self::Exited { .. } => ErrorKind::Exit,
        }
    }

    /// Returns the exit code the controlling process should use after the pager failed.
    ///
    /// Killed by a signal gives `128 + signal`; a non-zero exit code gives 141,
    /// the SIGPIPE convention git follows when its pager fails.
    /// Errors not caused by the pager's own exit give `None`.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { status, .. } => exit_code(*status),
            _ => None,
        }
    }
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(signal) = status.signal() {
        // SIGPIPE is 13, so 128 + 13 = 141
        return Some(128 + signal);
    }
    status.code().filter(|&code| code != 0).map(|_| 141)
}

// ---

/// Category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Descriptor duplication, pipe creation, redirection or signal setup failed while starting.
    Resource,
    /// The pager could not be started.
    Launch,
    /// Closing the pipe or redirecting stdout to the null device failed.
    Teardown,
    /// Putting the original stdout back failed.
    Restore,
    /// The pager itself failed or could not be waited for.
    Exit,
}

// ---

/// Result is an alias for standard result with bound Error type.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) trait Shared<T> {
    fn shared(self, f: impl FnOnce(Arc<io::Error>) -> Error) -> Result<T>;
}

impl<T> Shared<T> for io::Result<T> {
    fn shared(self, f: impl FnOnce(Arc<io::Error>) -> Error) -> Result<T> {
        self.map_err(|e| f(Arc::new(e)))
    }
}
