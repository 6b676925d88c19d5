//! Transparent paging of a process's own standard output.
//!
//! [`start`] redirects the process-wide stdout into the input of an external
//! pager, so that everything written to stdout, including output of code that
//! knows nothing about paging, ends up in the pager. [`PagerHandle::wait`]
//! blocks until the pager exits and puts the original stdout back.
#![cfg(unix)]

// std imports
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ffi::OsStr;
use std::io::{self, IsTerminal, Write, stdin};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;

// third-party imports
use signal_hook::iterator::Handle;

// local imports
use signal::{InterruptLimit, Interrupts, Target};
use stdio::{Redirection, Slot};

mod error;
mod signal;
mod stdio;


pub use error::{Error, ErrorKind, Result};
pub use lifecycle::Phase;

use error::Shared;

type Coordinator = lifecycle::Coordinator<Redirection, ()>;

// ---

/// Starts `name` with `args` as a pager for this process's stdout.
///
/// On failure nothing is left redirected.
pub fn start<I, S>(name: impl AsRef<OsStr>, args: I) -> Result<PagerHandle>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(name);
    command.args(args);
    launch(command, None)
}

// ---

/// Pager configuration and builder.
///
/// Supports two origins:
/// - **FromEnv**: Resolves the pager command from environment variables (`PAGER`, or an
///   application-specific variable). Returns `None` from `start()` if no pager is configured.
/// - **Custom**: Uses a pre-resolved command, skipping all resolution logic.
pub struct Pager {
    origin: CommandOrigin,
    env: HashMap<String, String>,
    env_provider: Box<dyn Fn(&str) -> Option<String>>,
    interrupt_limit: Option<InterruptLimit>,
}

impl Pager {
    /// Creates a new pager configuration that resolves from environment variables.
    ///
    /// Checks `PAGER` environment variable. Returns `None` from `start()` if not set.
    pub fn from_env() -> Self {
        Self::new(CommandOrigin::FromEnv { app_env_var: None })
    }

    /// Creates a pager with a pre-resolved command, skipping environment variable resolution.
    pub fn custom(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandOrigin::Custom {
            command: command.into_iter().map(Into::into).collect(),
        })
    }

    fn new(origin: CommandOrigin) -> Self {
        Self {
            origin,
            env: HashMap::new(),
            env_provider: Box::new(|name| env::var(name).ok()),
            interrupt_limit: None,
        }
    }

    /// Sets an application-specific environment variable to check
    /// for the pager command (e.g. `"APP_PAGER"`).
    /// Takes priority over `PAGER`.
    ///
    /// Only used with environment origin (created with [`Pager::from_env`]).
    pub fn lookup_var(mut self, name: impl Into<String>) -> Self {
        if let CommandOrigin::FromEnv { ref mut app_env_var } = self.origin {
            *app_env_var = Some(name.into());
        }
        self
    }

    /// Replaces the function used to read environment variables during resolution.
    pub fn with_env_provider(mut self, provider: impl Fn(&str) -> Option<String> + 'static) -> Self {
        self.env_provider = Box::new(provider);
        self
    }

    /// Sets an environment variable to pass to the pager process.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets multiple environment variables to pass to the pager process.
    pub fn with_env(mut self, vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Makes the process exit with `128 + signal` once `max_count` interrupts
    /// arrive with no more than `window` between consecutive ones.
    ///
    /// By default interrupts are only forwarded to the pager and close the pipe,
    /// leaving it to the pager's exit status to decide the outcome.
    pub fn exit_on_interrupts(mut self, max_count: usize, window: Duration) -> Self {
        self.interrupt_limit = (max_count != 0).then_some(InterruptLimit { max_count, window });
        self
    }

    /// Starts the pager process and redirects stdout into it.
    ///
    /// Returns `None` if the origin is `FromEnv` and no pager is configured in environment variables.
    pub fn start(self) -> Option<Result<PagerHandle>> {
        let (exe, args) = match self.origin {
            CommandOrigin::FromEnv { app_env_var } => resolve(app_env_var, &self.env_provider)?,
            CommandOrigin::Custom { command } => match command.split_first() {
                Some((exe, args)) => (exe.clone(), args.to_vec()),
                None => return Some(Err(Error::EmptyCommand)),
            },
        };

        let mut command = Command::new(exe);
        command.args(args);
        command.envs(self.env);

        Some(launch(command, self.interrupt_limit))
    }
}

// ---

/// The origin of the pager command, determining how it should be resolved.
enum CommandOrigin {
    /// Resolve pager from environment variables.
    FromEnv { app_env_var: Option<String> },
    /// Use a custom command.
    Custom { command: Vec<String> },
}

/// Resolves the pager command from environment variables.
///
/// Returns `None` if no pager is configured.
fn resolve(app_env_var: Option<String>, get: impl Fn(&str) -> Option<String>) -> Option<(String, Vec<String>)> {
    let non_blank = |v: &String| !v.trim().is_empty();
    let pager = app_env_var
        .and_then(|v| get(&v))
        .filter(non_blank)
        .or_else(|| get("PAGER").filter(non_blank))?;

    let parts = shellwords::split(&pager).unwrap_or_else(|_| vec![pager.clone()]);
    match parts.split_first() {
        Some((exe, args)) => Some((exe.clone(), args.to_vec())),
        None => Some((pager, Vec::new())),
    }
}

// ---

fn launch(mut command: Command, limit: Option<InterruptLimit>) -> Result<PagerHandle> {
    let program = describe(&command);

    // pending output belongs to the original destination
    if let Err(err) = io::stdout().flush() {
        log::debug!("failed to flush stdout before paging: {err}");
    }

    let interrupts = Interrupts::register()?;
    let backup = Slot::STDOUT.backup().shared(Error::Backup)?;
    let (reader, writer) = stdio::pipe().shared(Error::Pipe)?;

    command
        .stdin(Stdio::from(reader.try_clone().shared(Error::Pipe)?))
        .stdout(Stdio::from(backup.try_clone().shared(Error::Backup)?));
    let mut child = command.spawn().shared(|source| Error::Launch {
        command: program.clone(),
        source,
    })?;
    let pid = child.id();
    log::debug!("pager {program:?} started with pid {pid}");

    // the pager is attached now, so the local write end may go away after installation
    let redirection = match Redirection::install(Slot::STDOUT, writer, reader, backup) {
        Ok(redirection) => redirection,
        Err(err) => {
            abandon(&mut child);
            return Err(err);
        }
    };

    let coordinator = Arc::new(Coordinator::new(redirection));
    let target = Arc::new(Target::new(pid));
    let (signals, forwarder) = interrupts.forward(target.clone(), coordinator.clone(), limit);
    let watcher = watch(child, target, program.clone(), coordinator.clone(), signals.clone());

    Ok(PagerHandle {
        pid,
        command: program,
        coordinator,
        signals,
        threads: vec![watcher, forwarder],
    })
}

/// Waits for the pager in the background and records its outcome.
fn watch(
    mut child: Child,
    target: Arc<Target>,
    command: String,
    coordinator: Arc<Coordinator>,
    signals: Handle,
) -> JoinHandle<()> {
    spawn(move || {
        // stop forwarding before the pid is released
        target.settle();
        let outcome = match child.wait() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                recover(status);
                Err(Error::Exited { command, status })
            }
            Err(err) => Err(Error::WaitFailed(Arc::new(err))),
        };
        log::debug!("pager exited: {outcome:?}");
        coordinator.complete(outcome);
        signals.close();
    })
}

fn abandon(child: &mut Child) {
    child.kill().ok();
    child.wait().ok();
}

fn describe(command: &Command) -> String {
    let words: Vec<String> = std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(OsStr::to_string_lossy)
        .map(|word| word.into_owned())
        .collect();
    shellwords::join(&words.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Re-enables terminal echo after the pager was killed without a chance to do it.
fn recover(status: ExitStatus) {
    if status.signal() == Some(libc::SIGKILL) {
        log::debug!("pager killed");
        if stdin().is_terminal() {
            Command::new("stty").arg("echo").status().ok();
        }
    }
}

// ---

/// A running pager that stdout is redirected to.
///
/// When dropped, waits for the pager to exit and restores stdout.
pub struct PagerHandle {
    pid: u32,
    command: String,
    coordinator: Arc<Coordinator>,
    signals: Handle,
    threads: Vec<JoinHandle<()>>,
}

impl fmt::Debug for PagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagerHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl PagerHandle {
    /// Closes the pager's input, waits for it to exit and restores stdout.
    ///
    /// Returns `Ok(())` if the pager exited successfully and stdout was restored.
    /// Can be called many times and from many threads; all calls return the same result.
    pub fn wait(&self) -> Result<()> {
        if let Err(err) = io::stdout().flush() {
            log::debug!("failed to flush stdout into pager: {err}");
        }
        self.coordinator.wait()
    }

    /// Returns the pager's process id.
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Returns the pager's command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the teardown phase of the pager pipe.
    pub fn phase(&self) -> Phase {
        self.coordinator.phase()
    }

    /// Returns `true` once the pager has exited and its outcome is recorded.
    pub fn is_finished(&self) -> bool {
        self.coordinator.is_complete()
    }
}

impl Drop for PagerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.wait() {
            log::debug!("pager {:?} finished with error: {err}", self.command);
        }
        self.signals.close();
        for thread in self.threads.drain(..) {
            thread.join().ok();
        }
    }
}
