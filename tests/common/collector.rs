//! In-process TCP collector recording every received line.

use std::{
    io::{BufRead, BufReader},
    net::{SocketAddr, TcpListener},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

/// Accepts any number of connections and forwards their lines to a channel.
pub struct LineCollector {
    addr: SocketAddr,
    lines: mpsc::Receiver<String>,
    accepted: Arc<AtomicUsize>,
}

impl LineCollector {
    pub fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind collector");
        let addr = listener.local_addr().expect("collector has address");
        let (tx, lines) = mpsc::channel();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                thread::spawn(move || {
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else {
                            return;
                        };
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                });
            }
        });
        Self {
            addr,
            lines,
            accepted,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for `count` lines, failing the test if they do not arrive.
    pub fn expect_lines(&self, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                self.lines
                    .recv_timeout(Duration::from_secs(2))
                    .expect("collector received line")
            })
            .collect()
    }

    /// Assert that nothing else arrives within a short grace period.
    pub fn expect_silence(&self) {
        assert!(
            self.lines.recv_timeout(Duration::from_millis(100)).is_err(),
            "collector received an unexpected line"
        );
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}
