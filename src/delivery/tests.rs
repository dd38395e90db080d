//! Tests for the connection manager and delivery engine.

use std::{
    io::{self, BufRead, BufReader},
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use logtest::Logger;
use native_tls::{Identity, TlsAcceptor};
use rstest::{fixture, rstest};
use serial_test::serial;

use crate::{
    config::RetryPolicy,
    error::SendError,
    test_utils::{RecordingSleep, ScriptedConnector},
};

use super::{
    ConnectionManager, DeliveryAttempt, DeliveryEngine, Endpoint, TcpConnector, TlsOptions,
    connect_endpoint, is_retryable,
};

const REFUSED: io::ErrorKind = io::ErrorKind::ConnectionRefused;

fn scripted_engine(
    connector: &ScriptedConnector,
    sleeper: &RecordingSleep,
) -> DeliveryEngine<ScriptedConnector, RecordingSleep> {
    DeliveryEngine::with_sleeper(connector.clone(), RetryPolicy::default(), sleeper.clone())
}

#[rstest]
fn delivery_attempt_backs_off_from_incremented_count() {
    let mut attempt = DeliveryAttempt::new(RetryPolicy::default());
    assert_eq!(attempt.next_delay(), Some(Duration::from_secs(2)));
    assert_eq!(attempt.next_delay(), Some(Duration::from_secs(4)));
    assert_eq!(attempt.next_delay(), None);
    assert_eq!(attempt.retries(), 2);
}

#[rstest]
fn delivery_attempt_without_retries_gives_up_immediately() {
    let policy = RetryPolicy {
        max_retries: 0,
        base: Duration::from_millis(10),
    };
    let mut attempt = DeliveryAttempt::new(policy);
    assert_eq!(attempt.next_delay(), None);
    assert_eq!(attempt.retries(), 0);
}

#[rstest]
#[case(io::ErrorKind::ConnectionRefused, true)]
#[case(io::ErrorKind::TimedOut, true)]
#[case(io::ErrorKind::WouldBlock, true)]
#[case(io::ErrorKind::BrokenPipe, true)]
#[case(io::ErrorKind::ConnectionReset, true)]
#[case(io::ErrorKind::InvalidData, false)]
#[case(io::ErrorKind::PermissionDenied, false)]
#[case(io::ErrorKind::NotFound, false)]
fn classifies_connection_level_errors(#[case] kind: io::ErrorKind, #[case] retryable: bool) {
    assert_eq!(is_retryable(&io::Error::new(kind, "boom")), retryable);
}

#[rstest]
fn send_writes_line_with_terminator() {
    let connector = ScriptedConnector::new();
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    engine.send("hello TOK").expect("send succeeds");

    assert_eq!(connector.written(), "hello TOK\n");
    assert!(sleeper.delays().is_empty());
}

#[rstest]
fn connection_is_reused_across_sends() {
    let connector = ScriptedConnector::new();
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    engine.send("one").expect("first send");
    engine.send("two").expect("second send");

    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(engine.connections().connect_count(), 1);
    assert_eq!(connector.lines(), ["one", "two"]);
}

#[rstest]
fn recovers_after_two_refused_connects() {
    let connector = ScriptedConnector::new().fail_connects([REFUSED, REFUSED]);
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    engine.send("hello TOK").expect("third attempt succeeds");

    assert_eq!(engine.connections().reset_count(), 2);
    assert_eq!(connector.connect_attempts(), 3);
    assert_eq!(
        sleeper.delays(),
        [Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(connector.written(), "hello TOK\n");
}

#[rstest]
fn gives_up_after_retry_ceiling() {
    let connector = ScriptedConnector::new().fail_connects([REFUSED, REFUSED, REFUSED, REFUSED]);
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    let err = engine.send("lost").expect_err("ceiling must be hit");

    let failure = match err {
        SendError::Exhausted(failure) => failure,
        other => panic!("expected exhausted retries, got {other}"),
    };
    assert_eq!(failure.retries, 2);
    assert_eq!(failure.source.kind(), REFUSED);
    assert_eq!(failure.destination, "scripted:0");
    assert!(failure.to_string().contains("after 2 retries"));
    assert_eq!(connector.connect_attempts(), 3, "no attempt past the ceiling");
    assert_eq!(sleeper.delays().len(), 2);
}

#[rstest]
fn broken_write_discards_stream_and_reconnects() {
    let connector = ScriptedConnector::new().fail_writes([io::ErrorKind::BrokenPipe]);
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    engine.send("again").expect("retry succeeds");

    assert_eq!(connector.connect_attempts(), 2);
    assert_eq!(engine.connections().reset_count(), 1);
    assert_eq!(sleeper.delays(), [Duration::from_secs(2)]);
    assert_eq!(connector.lines(), ["again"]);
}

#[rstest]
fn non_connection_errors_are_not_retried() {
    let connector = ScriptedConnector::new().fail_writes([io::ErrorKind::InvalidData]);
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    let err = engine.send("bad").expect_err("must propagate");

    assert!(matches!(
        &err,
        SendError::Transport { source, .. } if source.kind() == io::ErrorKind::InvalidData
    ));
    assert_eq!(connector.connect_attempts(), 1);
    assert_eq!(engine.connections().reset_count(), 0);
    assert!(sleeper.delays().is_empty());
}

#[rstest]
#[serial]
fn logs_warning_per_retry_and_error_on_failure() {
    let mut logger = Logger::start();
    let connector = ScriptedConnector::new()
        .with_destination("scripted:log-test")
        .fail_connects([REFUSED, REFUSED, REFUSED]);
    let sleeper = RecordingSleep::new();
    let mut engine = scripted_engine(&connector, &sleeper);

    engine.send("lost").expect_err("ceiling must be hit");

    let mut warnings = 0;
    let mut errors = 0;
    while let Some(record) = logger.pop() {
        if !record.args().contains("scripted:log-test") {
            continue;
        }
        match record.level() {
            log::Level::Warn => warnings += 1,
            log::Level::Error => errors += 1,
            _ => {}
        }
    }
    assert_eq!(warnings, 2);
    assert_eq!(errors, 1);
}

#[rstest]
fn close_disconnects_open_stream() {
    let connector = ScriptedConnector::new();
    let mut manager = ConnectionManager::new(connector.clone());
    manager.connection().expect("connect");
    assert!(manager.is_connected());

    manager.close().expect("close");

    assert!(!manager.is_connected());
    assert_eq!(connector.disconnects(), 1);
    manager.close().expect("closing twice is a no-op");
    assert_eq!(connector.disconnects(), 1);
}

#[rstest]
fn reset_forces_a_new_connection() {
    let connector = ScriptedConnector::new();
    let mut manager = ConnectionManager::new(connector.clone());
    manager.connection().expect("first connect");
    manager.reset();
    assert!(!manager.is_connected());
    manager.connection().expect("second connect");
    assert_eq!(manager.connect_count(), 2);
    assert_eq!(connector.disconnects(), 0, "reset does not close gracefully");
}

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn spawn_line_server(listener: TcpListener, lines: usize) -> (SocketAddr, mpsc::Receiver<String>) {
    let addr = listener.local_addr().expect("listener has address");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept connection");
        let reader = BufReader::new(stream);
        for line in reader.lines().take(lines) {
            tx.send(line.expect("read line")).expect("forward line");
        }
    });
    (addr, rx)
}

fn tcp_connector(addr: SocketAddr) -> TcpConnector {
    TcpConnector::new(
        Endpoint::tcp(addr.ip().to_string(), addr.port()),
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
}

#[rstest]
fn sends_lines_over_tcp(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_line_server(tcp_listener, 2);
    let mut engine = DeliveryEngine::new(tcp_connector(addr), RetryPolicy::default());

    engine.send("m1 TK1").expect("first line");
    engine.send("m2 TK1").expect("second line");

    let received: Vec<String> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).expect("line received"))
        .collect();
    assert_eq!(received, ["m1 TK1", "m2 TK1"]);
    engine.close().expect("close connection");
}

#[rstest]
fn refused_tcp_connect_is_retryable(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    drop(tcp_listener);
    let sleeper = RecordingSleep::new();
    let mut engine =
        DeliveryEngine::with_sleeper(tcp_connector(addr), RetryPolicy::default(), sleeper.clone());

    let err = engine.send("nobody home").expect_err("nothing is listening");

    assert!(matches!(err, SendError::Exhausted(ref failure) if failure.retries == 2));
    assert_eq!(sleeper.delays().len(), 2);
}

#[rstest]
fn missing_ca_file_fails_before_connecting() {
    let endpoint = Endpoint {
        host: "127.0.0.1".into(),
        port: 9,
        tls: Some(TlsOptions {
            domain: "localhost".into(),
            ca_file: "/nonexistent/ca.pem".into(),
        }),
    };
    let err = connect_endpoint(&endpoint, Duration::from_millis(100))
        .expect_err("missing ca must fail");
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert!(!is_retryable(&err));
}

#[rstest]
fn invalid_ca_file_is_not_retried() {
    let ca = tempfile::NamedTempFile::new().expect("create ca file");
    std::fs::write(ca.path(), "not a certificate").expect("write ca file");
    let connector = TcpConnector::new(
        Endpoint {
            host: "127.0.0.1".into(),
            port: 9,
            tls: Some(TlsOptions {
                domain: "localhost".into(),
                ca_file: ca.path().to_path_buf(),
            }),
        },
        Duration::from_millis(100),
        Duration::from_millis(100),
    );
    let sleeper = RecordingSleep::new();
    let mut engine =
        DeliveryEngine::with_sleeper(connector, RetryPolicy::default(), sleeper.clone());

    let err = engine.send("secret").expect_err("bad ca must fail");

    assert!(matches!(err, SendError::Transport { .. }));
    assert!(sleeper.delays().is_empty());
}

fn tls_fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/tls")
        .join(name)
}

/// Accept one TLS connection presenting `cert` and forward its lines.
fn spawn_tls_line_server(
    listener: TcpListener,
    cert: &str,
) -> (SocketAddr, mpsc::Receiver<String>) {
    let addr = listener.local_addr().expect("listener has address");
    let pem = std::fs::read(tls_fixture(&format!("{cert}.pem"))).expect("read certificate");
    let key = std::fs::read(tls_fixture(&format!("{cert}-key.pem"))).expect("read key");
    let identity = Identity::from_pkcs8(&pem, &key).expect("build identity");
    let acceptor = TlsAcceptor::new(identity).expect("build acceptor");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept connection");
        // A rejected handshake ends the server without sending anything.
        let Ok(stream) = acceptor.accept(stream) else {
            return;
        };
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else {
                return;
            };
            if tx.send(line).is_err() {
                return;
            }
        }
    });
    (addr, rx)
}

fn tls_connector(addr: SocketAddr, domain: &str) -> TcpConnector {
    TcpConnector::new(
        Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            tls: Some(TlsOptions {
                domain: domain.into(),
                ca_file: tls_fixture("ca.pem"),
            }),
        },
        Duration::from_secs(2),
        Duration::from_secs(2),
    )
}

#[rstest]
fn sends_lines_over_verified_tls(tcp_listener: TcpListener) {
    let (addr, rx) = spawn_tls_line_server(tcp_listener, "server");
    let mut engine = DeliveryEngine::new(tls_connector(addr, "localhost"), RetryPolicy::default());

    engine.send("m1 TK1").expect("line sent over tls");

    let line = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("line received");
    assert_eq!(line, "m1 TK1");
    engine.close().expect("close tls connection");
}

#[rstest]
#[case::untrusted_issuer("rogue", "localhost")]
#[case::wrong_hostname("server", "collector.example")]
fn unverifiable_peer_is_a_transport_error(
    tcp_listener: TcpListener,
    #[case] cert: &str,
    #[case] domain: &str,
) {
    let (addr, rx) = spawn_tls_line_server(tcp_listener, cert);
    let sleeper = RecordingSleep::new();
    let mut engine = DeliveryEngine::with_sleeper(
        tls_connector(addr, domain),
        RetryPolicy::default(),
        sleeper.clone(),
    );

    let err = engine.send("secret TK1").expect_err("peer must be rejected");

    assert!(matches!(err, SendError::Transport { .. }), "unexpected error: {err}");
    assert!(sleeper.delays().is_empty());
    assert!(!engine.connections().is_connected());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[rstest]
fn tls_handshake_respects_timeout(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener has address");
    let (accepted_tx, accepted_rx) = mpsc::channel();
    thread::spawn(move || {
        let (stream, _) = tcp_listener.accept().expect("accept connection");
        accepted_tx.send(()).expect("signal accepted");
        // Hold the socket open without ever answering the ClientHello.
        thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let (result_tx, result_rx) = mpsc::channel();
    thread::spawn(move || {
        let endpoint = Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
            tls: Some(TlsOptions {
                domain: "localhost".into(),
                ca_file: tls_fixture("ca.pem"),
            }),
        };
        let start = Instant::now();
        let ok = connect_endpoint(&endpoint, Duration::from_millis(250)).is_ok();
        result_tx
            .send((ok, start.elapsed()))
            .expect("send handshake result");
    });

    accepted_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("connection must be accepted");
    let (ok, elapsed) = result_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("handshake result should arrive");
    assert!(!ok, "handshake with a stalled peer must fail");
    assert!(
        elapsed < Duration::from_secs(2),
        "handshake should respect timeout, elapsed {elapsed:?}"
    );
}
