#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{Capture, eventually, out};

#[test]
fn pager_exiting_immediately_does_not_break_pipe() {
    let capture = Capture::stdout();

    let pager = pager::start("true", [] as [&str; 0]).unwrap();
    out(vec![b'x'; 1024]).unwrap();
    assert!(eventually(Duration::from_secs(10), || pager.is_finished()));

    // nobody reads anymore, yet writing must neither block nor fail
    out(vec![b'y'; 256 * 1024]).unwrap();

    assert!(pager.wait().is_ok());
    out("after\n").unwrap();
    assert_eq!(capture.contents(), "after\n");
}
