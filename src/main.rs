// std imports
#[cfg(unix)]
use std::error::Error;
use std::process;

// third-party imports
use env_logger::{self as logger};

const PIPEPAGER_DEBUG_LOG: &str = "PIPEPAGER_DEBUG_LOG";
const PIPEPAGER_DEBUG_LOG_STYLE: &str = "PIPEPAGER_DEBUG_LOG_STYLE";

// ---

fn bootstrap() {
    if std::env::var(PIPEPAGER_DEBUG_LOG).is_ok() {
        logger::Builder::from_env(
            logger::Env::new()
                .filter(PIPEPAGER_DEBUG_LOG)
                .write_style(PIPEPAGER_DEBUG_LOG_STYLE),
        )
        .format_timestamp_micros()
        .init();
        log::debug!("logging initialized");
    } else {
        logger::Builder::new()
            .filter_level(log::LevelFilter::Error)
            .format_timestamp_millis()
            .init()
    }
}

#[cfg(unix)]
mod demo {
    // std imports
    use std::io::{Write, stdout};
    use std::thread::sleep;
    use std::time::Duration;

    // third-party imports
    use pager::{Pager, Result};

    const PIPEPAGER_PAGER: &str = "PIPEPAGER_PAGER";
    const DEFAULT_PAGER: &str = "less";
    const DEFAULT_PAGER_ARGS: [&str; 1] = ["-R"];
    const LINES: usize = 1000;
    const DELAY: Duration = Duration::from_micros(500);

    pub fn run() -> Result<()> {
        let pager = match Pager::from_env().lookup_var(PIPEPAGER_PAGER).start() {
            Some(started) => started?,
            None => pager::start(DEFAULT_PAGER, DEFAULT_PAGER_ARGS)?,
        };
        log::debug!("paging through {:?} (pid {})", pager.command(), pager.id());

        let mut out = stdout();
        for i in 0..LINES {
            if let Err(err) = writeln!(out, "Line {i}") {
                log::debug!("stopped writing: {err}");
                break;
            }
            sleep(DELAY);
        }

        pager.wait()?;
        writeln!(out, "DONE").ok();
        Ok(())
    }
}

/// Formats an error together with its causes.
#[cfg(unix)]
fn chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(unix)]
fn main() {
    bootstrap();
    if let Err(err) = demo::run() {
        log::debug!("pager failed: {err:?}");
        eprintln!("pipepager: {}", chain(&err));
        process::exit(err.exit_code().unwrap_or(1));
    }
}

#[cfg(not(unix))]
fn main() {
    bootstrap();
    eprintln!("pipepager: paging stdout is not supported on this platform");
    process::exit(1);
}
