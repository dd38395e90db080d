//! Retry behaviour of a forwarder whose collector misbehaves.

use std::{io, time::Duration};

use logentries_forwarder::{
    ForwardError, Forwarder, LogRecord, RetryPolicy,
    test_utils::{RecordingSleep, ScriptedConnector},
};
use rstest::rstest;
use serde_json::json;

mod common;

use common::token_dir;

const REFUSED: io::ErrorKind = io::ErrorKind::ConnectionRefused;

fn batch(messages: &[&str]) -> Vec<LogRecord> {
    messages
        .iter()
        .map(|message| LogRecord::new("app.foo", json!({ "message": message })))
        .collect()
}

#[rstest]
fn two_refusals_then_success_delivers_the_batch() {
    let dir = token_dir(&[("foo", "TK1\n")]);
    let connector = ScriptedConnector::new().fail_connects([REFUSED, REFUSED]);
    let sleeper = RecordingSleep::new();
    let forwarder = Forwarder::with_parts(
        dir.path(),
        connector.clone(),
        RetryPolicy::default(),
        sleeper.clone(),
    );

    let report = forwarder.deliver(&batch(&["m1", "m2"])).expect("batch delivered");

    assert_eq!(report.sent, 2);
    assert_eq!(connector.lines(), ["m1 TK1", "m2 TK1"]);
    assert_eq!(
        sleeper.delays(),
        [Duration::from_secs(2), Duration::from_secs(4)]
    );
}

#[rstest]
fn exhausted_retries_stop_the_batch() {
    let dir = token_dir(&[("foo", "TK1\n")]);
    let connector = ScriptedConnector::new().fail_connects([REFUSED, REFUSED, REFUSED]);
    let sleeper = RecordingSleep::new();
    let forwarder = Forwarder::with_parts(
        dir.path(),
        connector.clone(),
        RetryPolicy::default(),
        sleeper.clone(),
    );

    let err = forwarder
        .deliver(&batch(&["m1", "m2", "m3"]))
        .expect_err("batch must fail");

    let ForwardError::Delivery(failure) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failure.retries, 2);
    assert!(err.to_string().contains("after 2 retries"));
    assert!(err.to_string().contains("scripted connect failure"));
    assert_eq!(connector.connect_attempts(), 3);
    assert!(connector.written().is_empty());
}

#[rstest]
fn next_batch_recovers_after_a_failed_one() {
    let dir = token_dir(&[("foo", "TK1\n")]);
    let connector = ScriptedConnector::new().fail_connects([REFUSED, REFUSED, REFUSED]);
    let forwarder = Forwarder::with_parts(
        dir.path(),
        connector.clone(),
        RetryPolicy::default(),
        RecordingSleep::new(),
    );

    forwarder.deliver(&batch(&["lost"])).expect_err("first batch fails");
    forwarder.deliver(&batch(&["kept"])).expect("host retry succeeds");

    assert_eq!(connector.lines(), ["kept TK1"]);
}

#[rstest]
fn custom_policy_changes_ceiling_and_backoff() {
    let dir = token_dir(&[("foo", "TK1\n")]);
    let connector = ScriptedConnector::new().fail_connects([REFUSED; 4]);
    let sleeper = RecordingSleep::new();
    let policy = RetryPolicy {
        max_retries: 4,
        base: Duration::from_millis(10),
    };
    let forwarder = Forwarder::with_parts(dir.path(), connector.clone(), policy, sleeper.clone());

    forwarder.deliver(&batch(&["m"])).expect("fifth attempt succeeds");

    let expected: Vec<_> = [20, 40, 80, 160].map(Duration::from_millis).into();
    assert_eq!(sleeper.delays(), expected);
}
