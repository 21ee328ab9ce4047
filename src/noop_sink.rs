use crate::record::LogRecord;
use crate::sink::LogSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A sink that simply drops all records, counting them.
///
/// Useful for measuring the overhead of the logger itself without any
/// external I/O.
#[derive(Clone, Default)]
pub struct NoopSink {
    pub received: Arc<AtomicU64>,
}

impl LogSink for NoopSink {
    fn deliver(&self, _record: &Arc<LogRecord>) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}
