//! Scripted connector and sleeper for exercising the retry path without a
//! network or real delays.

use std::{
    collections::VecDeque,
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;

use crate::delivery::{Connect, Sleep};

#[derive(Default)]
struct ScriptState {
    connect_failures: VecDeque<io::ErrorKind>,
    write_failures: VecDeque<io::ErrorKind>,
    connect_attempts: usize,
    disconnects: usize,
    written: Vec<u8>,
}

/// Connector whose connects and writes fail according to a script.
///
/// Clones share state, so a test can keep one handle for assertions after
/// moving another into the engine.
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
    destination: String,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            destination: "scripted:0".to_owned(),
        }
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the destination reported in diagnostics.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Fail the next connects with the given error kinds, in order.
    pub fn fail_connects(self, kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        self.state.lock().connect_failures.extend(kinds);
        self
    }

    /// Fail the next writes with the given error kinds, in order.
    pub fn fail_writes(self, kinds: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        self.state.lock().write_failures.extend(kinds);
        self
    }

    /// Connect calls made so far, failed ones included.
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Everything written so far, as text.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().written).into_owned()
    }

    /// Written lines without their terminators.
    pub fn lines(&self) -> Vec<String> {
        self.written().lines().map(str::to_owned).collect()
    }
}

impl Connect for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&self) -> io::Result<ScriptedStream> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if let Some(kind) = state.connect_failures.pop_front() {
            return Err(io::Error::new(kind, "scripted connect failure"));
        }
        Ok(ScriptedStream {
            state: Arc::clone(&self.state),
        })
    }

    fn destination(&self) -> String {
        self.destination.clone()
    }

    fn disconnect(&self, _stream: ScriptedStream) -> io::Result<()> {
        self.state.lock().disconnects += 1;
        Ok(())
    }
}

/// Stream handed out by [`ScriptedConnector`].
pub struct ScriptedStream {
    state: Arc<Mutex<ScriptState>>,
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_failures.pop_front() {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sleeper that records requested delays instead of blocking.
#[derive(Clone, Default)]
pub struct RecordingSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl Sleep for RecordingSleep {
    fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
    }
}
