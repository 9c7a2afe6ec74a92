//! The shared output sink.
//!
//! All informational text and all child process output go through one sink
//! in arrival order. Writes are atomic at line granularity.

use std::io::Write;
use std::sync::Mutex;

/// A line-oriented output sink shared across workers.
pub trait OutputSink: Send + Sync {
    /// Write one line. Implementations must keep lines whole under
    /// concurrent callers.
    fn line(&self, line: &str);
}

/// Sink writing to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut locked = stdout.lock();
        let _ = writeln!(locked, "{line}");
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("sink lock poisoned").clone()
    }
}

impl OutputSink for BufferSink {
    fn line(&self, line: &str) {
        self.lines
            .lock()
            .expect("sink lock poisoned")
            .push(line.to_string());
    }
}
