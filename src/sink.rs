use crate::record::LogRecord;
use std::sync::Arc;

/// Destination for [`LogRecord`]s fanned out by the [`Logger`](crate::logger::Logger).
///
/// Implementations own their transport (stdout, a TCP aggregator, etc).
/// The logger calls `deliver` on the emitting thread, so it must return
/// quickly: network sinks hand the record to a background task and return.
pub trait LogSink: Send + Sync {
    /// Hand a single record to the sink.
    ///
    /// **Parameters**
    /// - `record`: fully-populated, shared [`LogRecord`]. Sinks may clone the
    ///   `Arc` to keep it alive past this call.
    ///
    /// There is no return value: failures are reported on the sink's
    /// diagnostic channel and swallowed, so one sink can never prevent
    /// delivery to the others or disturb the caller.
    ///
    /// May be called concurrently from many emitting tasks; any transient
    /// resource (socket, buffer) belongs to a single call.
    fn deliver(&self, record: &Arc<LogRecord>);
}
