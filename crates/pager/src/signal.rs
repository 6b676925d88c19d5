// std imports
use std::io;
use std::mem;
use std::process::exit;
use std::ptr;
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};

// third-party imports
use libc::c_int;
use signal_hook::{
    consts::signal::SIGINT,
    iterator::{Handle, Signals},
};

// local imports
use crate::{
    Coordinator,
    error::{Error, Result, Shared},
};

// ---

/// Forced termination after repeated interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InterruptLimit {
    pub max_count: usize,
    pub window: Duration,
}

impl InterruptLimit {
    pub fn counter(self) -> InterruptCounter {
        InterruptCounter {
            limit: self,
            count: 0,
            last: Instant::now(),
        }
    }
}

/// Counts interrupts that follow each other within the limit's window.
pub(crate) struct InterruptCounter {
    limit: InterruptLimit,
    count: usize,
    last: Instant,
}

impl InterruptCounter {
    /// Registers an interrupt at `now`, returning `true` if the limit is reached.
    pub fn hit(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last) > self.limit.window {
            self.count = 0;
        }
        self.last = now;
        if self.count < self.limit.max_count {
            self.count += 1;
        }
        self.count == self.limit.max_count
    }
}

// ---

/// The pager process as a signal target.
///
/// The pager's pid may be recycled once it is reaped, so signals are only
/// sent while the exit is not yet observed. The exit is observed without
/// reaping, under the same lock that guards sending.
pub(crate) struct Target {
    pid: u32,
    exited: Mutex<bool>,
}

impl Target {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            exited: Mutex::new(false),
        }
    }

    /// Sends `signal` to the pager unless it has already exited.
    ///
    /// Returns `Ok(false)` if the pager has exited and nothing was sent.
    pub fn signal(&self, signal: c_int) -> io::Result<bool> {
        let exited = self.exited.lock().unwrap_or_else(|e| e.into_inner());
        if *exited {
            return Ok(false);
        }
        if unsafe { libc::kill(self.pid as libc::pid_t, signal) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(true)
    }

    /// Blocks until the pager exits, leaving it unreaped.
    ///
    /// After this returns, no more signals are sent to the pid and the caller is free to reap it.
    pub fn settle(&self) {
        loop {
            let mut info: libc::siginfo_t = unsafe { mem::zeroed() };
            let rc = unsafe {
                libc::waitid(
                    libc::P_PID,
                    self.pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WNOWAIT,
                )
            };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                log::debug!("failed to await pager exit: {err}");
                break;
            }
        }
        *self.exited.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }
}

// ---

/// Interrupt registration, made before stdout is touched.
///
/// Fields drop in order: the signal delivery is unregistered first, then
/// the previous disposition of the interrupt signal is put back.
pub(crate) struct Interrupts {
    signals: Signals,
    _disposition: Disposition,
}

impl Interrupts {
    pub fn register() -> Result<Self> {
        let mut state = DISPOSITION.lock().unwrap_or_else(|e| e.into_inner());
        if state.active == 0 {
            state.original = Some(sigaction::get(SIGINT).shared(Error::Signals)?);
        }
        let signals = Signals::new([SIGINT]).shared(Error::Signals)?;
        // the handler is installed by the signal registry only once per process,
        // so put it back if the original disposition was restored meanwhile
        if let Some(hook) = state.hook.take() {
            if let Err(err) = sigaction::set(SIGINT, &hook) {
                state.hook = Some(hook);
                return Err(Error::Signals(Arc::new(err)));
            }
        }
        state.active += 1;

        Ok(Self {
            signals,
            _disposition: Disposition,
        })
    }

    /// Starts forwarding interrupts to the pager process.
    ///
    /// Each interrupt is forwarded and closes the pager pipe, so that the pager
    /// reaches end-of-input while staying open for review.
    /// The returned handle stops the forwarder when closed, after which the
    /// interrupt signal gets its previous disposition back.
    pub fn forward(
        self,
        target: Arc<Target>,
        coordinator: Arc<Coordinator>,
        limit: Option<InterruptLimit>,
    ) -> (Handle, JoinHandle<()>) {
        let mut interrupts = self;
        let handle = interrupts.signals.handle();

        let thread = spawn(move || {
            let mut counter = limit.map(InterruptLimit::counter);
            for signal in interrupts.signals.forever() {
                if coordinator.is_complete() {
                    continue;
                }
                match target.signal(signal) {
                    Ok(true) => log::debug!("forwarded signal {signal} to pager"),
                    Ok(false) => log::debug!("pager already exited, signal {signal} not forwarded"),
                    Err(err) => log::debug!("failed to forward signal {signal} to pager: {err}"),
                }
                if let Err(err) = coordinator.close() {
                    log::debug!("pager pipe teardown on interrupt failed: {err}");
                }
                if let Some(counter) = counter.as_mut() {
                    if counter.hit(Instant::now()) {
                        exit(0x80 + signal);
                    }
                }
            }
            drop(interrupts);
            log::trace!("interrupt forwarder stopped");
        });

        (handle, thread)
    }
}

// ---

static DISPOSITION: Mutex<DispositionState> = Mutex::new(DispositionState {
    active: 0,
    original: None,
    hook: None,
});

struct DispositionState {
    active: usize,
    original: Option<libc::sigaction>,
    hook: Option<libc::sigaction>,
}

/// Puts back the interrupt disposition seen before the first active registration.
struct Disposition;

impl Drop for Disposition {
    fn drop(&mut self) {
        let mut state = DISPOSITION.lock().unwrap_or_else(|e| e.into_inner());
        state.active -= 1;
        if state.active != 0 {
            return;
        }
        let Some(original) = state.original.take() else {
            return;
        };
        let result = sigaction::get(SIGINT).and_then(|hook| {
            sigaction::set(SIGINT, &original)?;
            Ok(hook)
        });
        match result {
            Ok(hook) => {
                state.hook = Some(hook);
                log::trace!("interrupt disposition restored");
            }
            Err(err) => log::debug!("failed to restore interrupt disposition: {err}"),
        }
    }
}

mod sigaction {
    use super::*;

    pub fn get(signal: c_int) -> io::Result<libc::sigaction> {
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        if unsafe { libc::sigaction(signal, ptr::null(), &mut action) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(action)
    }

    pub fn set(signal: c_int, action: &libc::sigaction) -> io::Result<()> {
        if unsafe { libc::sigaction(signal, action, ptr::null_mut()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
