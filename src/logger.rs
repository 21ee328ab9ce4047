use crate::diagnostics::Diagnostics;
use crate::record::{Fields, Level, LogRecord};
use crate::sink::LogSink;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// `service` value used until [`LoggerBuilder::service`] names one.
pub const DEFAULT_SERVICE: &str = "unknown-service";

/// Fans [`LogRecord`]s out to a fixed, ordered set of [`LogSink`]s.
///
/// A `Logger` is built once at process start and passed around explicitly;
/// clones share the same sinks and metadata. Records below the configured
/// floor are dropped before any sink sees them.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

struct Inner {
    min_level: Level,
    defaults: Fields,
    sinks: Box<[Arc<dyn LogSink>]>,
    diagnostics: Diagnostics,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    pub fn min_level(&self) -> Level {
        self.inner.min_level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level.passes(self.inner.min_level)
    }

    /// Build a record from `message` and `fields` and hand it to every sink.
    ///
    /// Default metadata (such as `service`) is merged first; keys in
    /// `fields` win on conflict. Returns without waiting for any network
    /// delivery, and never panics because of a sink.
    pub fn log<I, K>(&self, level: Level, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        if !self.enabled(level) {
            return;
        }

        let mut merged = self.inner.defaults.clone();
        merged.extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
        let record = Arc::new(LogRecord::new(level, message, merged));

        for sink in self.inner.sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink.deliver(&record))).is_err() {
                self.inner
                    .diagnostics
                    .report(format!("log sink panicked while delivering `{}`", record.message()));
            }
        }
    }

    pub fn error<I, K>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.log(Level::Error, message, fields);
    }

    pub fn warn<I, K>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.log(Level::Warn, message, fields);
    }

    pub fn info<I, K>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.log(Level::Info, message, fields);
    }

    pub fn debug<I, K>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.log(Level::Debug, message, fields);
    }
}

/// Configuration for a [`Logger`].
///
/// **Defaults**
/// - `min_level`: `info`.
/// - default metadata: `service` = [`DEFAULT_SERVICE`].
/// - no sinks, diagnostics on stderr.
pub struct LoggerBuilder {
    min_level: Level,
    defaults: Fields,
    sinks: Vec<Arc<dyn LogSink>>,
    diagnostics: Diagnostics,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        let mut defaults = Fields::new();
        defaults.insert("service".to_string(), Value::String(DEFAULT_SERVICE.to_string()));
        Self {
            min_level: Level::Info,
            defaults,
            sinks: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }
}

impl LoggerBuilder {
    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Shorthand for the `service` default field.
    pub fn service(self, name: impl Into<String>) -> Self {
        self.default_field("service", Value::String(name.into()))
    }

    pub fn default_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    /// Append a sink; delivery follows registration order.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            inner: Arc::new(Inner {
                min_level: self.min_level,
                defaults: self.defaults,
                sinks: self.sinks.into_boxed_slice(),
                diagnostics: self.diagnostics,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        records: Mutex<Vec<Arc<LogRecord>>>,
    }

    impl LogSink for Collecting {
        fn deliver(&self, record: &Arc<LogRecord>) {
            self.records.lock().unwrap().push(Arc::clone(record));
        }
    }

    struct Panicking;

    impl LogSink for Panicking {
        fn deliver(&self, _record: &Arc<LogRecord>) {
            panic!("sink exploded");
        }
    }

    #[test]
    fn merges_service_and_caller_fields_win() {
        let sink = Arc::new(Collecting::default());
        let logger = Logger::builder()
            .service("web-service")
            .default_field("region", json!("eu"))
            .sink(sink.clone())
            .build();

        logger.info("Web service started", [("port", json!(3000)), ("region", json!("us"))]);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level(), Level::Info);
        assert_eq!(record.service(), Some("web-service"));
        assert_eq!(record.field("port"), Some(&json!(3000)));
        assert_eq!(record.field("region"), Some(&json!("us")));
    }

    #[test]
    fn records_below_floor_reach_no_sink() {
        let first = Arc::new(Collecting::default());
        let second = Arc::new(Collecting::default());
        let logger = Logger::builder()
            .min_level(Level::Error)
            .sink(first.clone())
            .sink(second.clone())
            .build();

        logger.info("ignored", Fields::new());
        logger.warn("ignored too", Fields::new());
        logger.error("kept", Fields::new());

        assert_eq!(first.records.lock().unwrap().len(), 1);
        assert_eq!(second.records.lock().unwrap().len(), 1);
        assert!(!logger.enabled(Level::Info));
    }

    #[test]
    fn panicking_sink_does_not_stop_fan_out() {
        let (diagnostics, mut rx) = Diagnostics::channel();
        let survivor = Arc::new(Collecting::default());
        let logger = Logger::builder()
            .sink(Arc::new(Panicking))
            .sink(survivor.clone())
            .diagnostics(diagnostics)
            .build();

        logger.error("still delivered", Fields::new());

        assert_eq!(survivor.records.lock().unwrap().len(), 1);
        assert!(rx.try_recv().unwrap().contains("panicked"));
    }

    #[test]
    fn service_defaults_when_unnamed() {
        let sink = Arc::new(Collecting::default());
        let logger = Logger::builder().sink(sink.clone()).build();

        logger.warn("no service configured", [("k", json!(1))]);
        logger.info("caller names it", [("service", json!("batch-job"))]);

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].service(), Some(DEFAULT_SERVICE));
        assert_eq!(records[1].service(), Some("batch-job"));
    }

    #[test]
    fn every_sink_sees_the_same_record() {
        let first = Arc::new(Collecting::default());
        let second = Arc::new(Collecting::default());
        let logger = Logger::builder().sink(first.clone()).sink(second.clone()).build();

        logger.info("shared", [("k", json!(1))]);

        let a = &first.records.lock().unwrap()[0];
        let b = &second.records.lock().unwrap()[0];
        assert!(Arc::ptr_eq(a, b));
    }
}
