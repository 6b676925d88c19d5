#![cfg(unix)]

mod common;

use common::{Capture, out};
use pager::Phase;

#[test]
fn start_then_wait_succeeds_and_restores_stdout() {
    let capture = Capture::stdout();
    out("before\n").unwrap();

    let pager = pager::start("true", [] as [&str; 0]).unwrap();
    assert!(pager.id() > 0);
    assert_eq!(pager.command(), "true");

    assert!(pager.wait().is_ok());
    assert_eq!(pager.phase(), Phase::Closed);
    assert!(pager.is_finished());

    out("after\n").unwrap();
    drop(pager);
    out("dropped\n").unwrap();

    assert_eq!(capture.contents(), "before\nafter\ndropped\n");
}
