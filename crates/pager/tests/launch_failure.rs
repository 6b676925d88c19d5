#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use common::{Capture, out};
use pager::{Error, ErrorKind, Pager};

#[test]
fn failed_launch_leaves_stdout_untouched() {
    let capture = Capture::stdout();

    let err = pager::start("/nonexistent/binary/pager_test_abc123", ["-R"]).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Launch);
    assert_matches!(&err, Error::Launch { command, .. } if command == "/nonexistent/binary/pager_test_abc123 -R");
    out("one\n").unwrap();

    let result = Pager::custom(["/nonexistent/binary/pager_test_abc123"]).start();
    assert_matches!(result, Some(Err(Error::Launch { .. })));
    out("two\n").unwrap();

    assert_eq!(capture.contents(), "one\ntwo\n");
}
