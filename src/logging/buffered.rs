//! Buffered logger for parallel task execution.
use std::sync::{Arc, Mutex};

use super::types::{Log, TaskStatus};

/// Serializes flushes so that blocks from tasks finishing together print one
/// after another.
static FLUSH_LOCK: Mutex<()> = Mutex::new(());

/// A single buffered log entry, replayed when flushed.
#[derive(Debug, Clone)]
enum LogEntry {
    Stage(String),
    Info(String),
    Debug(String),
    Warn(String),
    Error(String),
    DryRun(String),
}

impl LogEntry {
    /// Replay this entry into `sink`.
    fn replay(&self, sink: &dyn Log) {
        match self {
            Self::Stage(msg) => sink.stage(msg),
            Self::Info(msg) => sink.info(msg),
            Self::Debug(msg) => sink.debug(msg),
            Self::Warn(msg) => sink.warn(msg),
            Self::Error(msg) => sink.error(msg),
            Self::DryRun(msg) => sink.dry_run(msg),
        }
    }
}

/// Implement the display methods of [`Log`] by buffering each message into
/// `self.entries` as the corresponding [`LogEntry`] variant.
///
/// The `record_task` method is **not** included because it forwards to
/// `self.inner` instead of buffering.
macro_rules! buffer_log_methods {
    ($($method:ident => $variant:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                if let Ok(mut guard) = self.entries.lock() {
                    guard.push(LogEntry::$variant(msg.to_string()));
                }
            }
        )+
    };
}

/// Buffered logger for parallel task execution.
///
/// Captures display output (stage, info, debug, etc.) in memory so that
/// parallel tasks do not interleave their console output.  The captured
/// entries are replayed in order when [`flush`](Self::flush) is called.
///
/// [`record_task`](Log::record_task) is forwarded directly to the wrapped
/// sink because the summary collection is already thread-safe.
#[derive(Debug)]
pub struct BufferedLog {
    inner: Arc<dyn Log>,
    entries: Mutex<Vec<LogEntry>>,
}

impl BufferedLog {
    /// Create a new buffered logger in front of `inner`.
    #[must_use]
    pub const fn new(inner: Arc<dyn Log>) -> Self {
        Self {
            inner,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Replay all buffered entries into the wrapped sink, as one block.
    pub fn flush(&self) {
        let _guard = FLUSH_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entries = match self.entries.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        for entry in &entries {
            entry.replay(self.inner.as_ref());
        }
    }
}

impl Log for BufferedLog {
    buffer_log_methods! {
        stage   => Stage,
        info    => Info,
        debug   => Debug,
        warn    => Warn,
        error   => Error,
        dry_run => DryRun,
    }

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.inner.record_task(name, status, message);
    }
}
