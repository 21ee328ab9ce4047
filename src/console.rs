use crate::diagnostics::Diagnostics;
use crate::record::LogRecord;
use crate::sink::LogSink;
use std::io::Write;
use std::sync::Arc;

/// Stream a [`ConsoleSink`] writes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsoleTarget {
    #[default]
    Stdout,
    Stderr,
}

/// Mirrors records to the local console, one line each, synchronously.
///
/// Output looks like `info: HTTP Request {"method":"GET",...}`; the fields
/// object is left out when the record has none.
#[derive(Clone, Debug, Default)]
pub struct ConsoleSink {
    target: ConsoleTarget,
    diagnostics: Diagnostics,
}

impl ConsoleSink {
    pub fn new(target: ConsoleTarget) -> Self {
        Self {
            target,
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn format_line(record: &LogRecord) -> String {
        if record.fields().is_empty() {
            return format!("{}: {}", record.level(), record.message());
        }
        let fields = serde_json::to_string(record.fields()).unwrap_or_else(|_| "{}".to_string());
        format!("{}: {} {}", record.level(), record.message(), fields)
    }
}

impl LogSink for ConsoleSink {
    fn deliver(&self, record: &Arc<LogRecord>) {
        let line = Self::format_line(record);
        let result = match self.target {
            ConsoleTarget::Stdout => writeln!(std::io::stdout().lock(), "{}", line),
            ConsoleTarget::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
        };
        if let Err(e) = result {
            self.diagnostics.report(format!("console sink write failed: {}", e));
        }
    }
}
