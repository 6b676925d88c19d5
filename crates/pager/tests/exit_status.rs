#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use common::{Capture, out};
use pager::{Error, Pager};

#[test]
fn failing_pager_is_reported_after_restore() {
    let capture = Capture::stdout();

    let pager = Pager::custom(["sh", "-c", r#"cat > /dev/null; exit "$CODE""#])
        .with_env_var("CODE", "3")
        .start()
        .unwrap()
        .unwrap();
    out("paged\n").unwrap();

    let err = pager.wait().unwrap_err();
    assert_matches!(&err, Error::Exited { status, .. } if status.code() == Some(3));
    assert_eq!(err.exit_code(), Some(141));
    out("after\n").unwrap();

    assert_eq!(capture.contents(), "after\n");
}
