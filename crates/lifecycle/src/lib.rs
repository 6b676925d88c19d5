use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};


// ---

/// Resources whose teardown and restoration must each run exactly once.
///
/// Both methods are only ever called by [`Coordinator`] while it holds its lock,
/// so implementations may freely mutate process-wide state.
pub trait Shutdown {
    type Error: Clone;

    /// Severs the data path. Called at most once.
    fn teardown(&mut self) -> Result<(), Self::Error>;

    /// Puts back what was replaced at setup. Called at most once, after an outcome is available.
    fn restore(&mut self) -> Result<(), Self::Error>;
}

// ---

/// Teardown progress of a [`Coordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Closing,
    Closed,
}

// ---

/// Arbitrates between concurrent triggers that want to end an active phase.
///
/// Any number of callers may request teardown with [`close`](Self::close),
/// exactly one of them performs it and the rest reuse its result.
/// The party that observes the final event records the outcome with
/// [`complete`](Self::complete), and every caller of [`wait`](Self::wait)
/// receives that same outcome after a single restore step.
pub struct Coordinator<S: Shutdown, T> {
    state: Mutex<State<S, T>>,
    ready: Condvar,
}

impl<S, T> Coordinator<S, T>
where
    S: Shutdown,
    T: Clone,
{
    /// Creates a coordinator in the [`Phase::Open`] phase owning `resources`.
    pub fn new(resources: S) -> Self {
        Self {
            state: Mutex::new(State {
                resources,
                phase: Phase::Open,
                teardown: None,
                outcome: None,
                restored: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Requests teardown.
    ///
    /// The first call runs [`Shutdown::teardown`], later calls return its stored result.
    pub fn close(&self) -> Result<(), S::Error> {
        self.lock().close()
    }

    /// Records the final outcome and wakes all waiters.
    ///
    /// Teardown is performed first if nobody requested it yet. A teardown error
    /// takes precedence over `outcome`. Only the first call has any effect.
    pub fn complete(&self, outcome: Result<T, S::Error>) {
        let mut state = self.lock();
        let teardown = state.close();
        if state.outcome.is_none() {
            state.outcome = Some(teardown.and(outcome));
        }
        drop(state);
        self.ready.notify_all();
    }

    /// Requests teardown, blocks until the outcome is recorded, restores once and returns the outcome.
    ///
    /// Safe to call from many threads and many times; all calls return the same value.
    /// A restore error replaces the recorded outcome.
    pub fn wait(&self) -> Result<T, S::Error> {
        let mut state = self.lock();
        // the outcome carries the teardown result, so it is not needed here
        state.close().ok();

        loop {
            if let Some(outcome) = state.outcome.clone() {
                if state.restored {
                    return outcome;
                }
                state.restored = true;
                let outcome = state.resources.restore().and(outcome);
                state.outcome = Some(outcome.clone());
                return outcome;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns the current teardown phase.
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Returns `true` once the outcome has been recorded.
    pub fn is_complete(&self) -> bool {
        self.lock().outcome.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State<S, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---

struct State<S: Shutdown, T> {
    resources: S,
    phase: Phase,
    teardown: Option<Result<(), S::Error>>,
    outcome: Option<Result<T, S::Error>>,
    restored: bool,
}

impl<S: Shutdown, T> State<S, T> {
    fn close(&mut self) -> Result<(), S::Error> {
        if self.phase == Phase::Open {
            self.phase = Phase::Closing;
            self.teardown = Some(self.resources.teardown());
            self.phase = Phase::Closed;
        }
        self.teardown.clone().unwrap_or(Ok(()))
    }
}
