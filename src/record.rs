use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Contextual attributes attached to a [`LogRecord`].
pub type Fields = BTreeMap<String, Value>;

/// Severity of a [`LogRecord`], most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }

    /// Whether a record at `self` passes a logger whose floor is `min`.
    pub fn passes(&self, min: Level) -> bool {
        *self <= min
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Level::Error
        } else if *level == tracing::Level::WARN {
            Level::Warn
        } else if *level == tracing::Level::INFO {
            Level::Info
        } else if *level == tracing::Level::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

/// Error returned when a severity name is not recognized.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown log level `{0}`")]
pub struct LevelParseError(pub String);

impl FromStr for Level {
    type Err = LevelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(LevelParseError(s.to_string())),
        }
    }
}

/// Immutable structured event handed to every sink.
///
/// Records are built once by the [`Logger`](crate::logger::Logger) and then
/// shared read-only behind an `Arc`; each sink serializes its own copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: Level,
    message: String,
    fields: Fields,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>, fields: Fields) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The `service` metadata merged in by the logger, if any.
    pub fn service(&self) -> Option<&str> {
        self.fields.get("service").and_then(Value::as_str)
    }

    /// Serialize into one newline-terminated JSON object for the aggregator.
    ///
    /// `@timestamp` is taken now (delivery attempt time) and sits next to
    /// `timestamp` (event time). Fields are flattened at top level; the core
    /// keys win over same-named fields.
    pub fn to_wire_line(&self) -> Result<String, serde_json::Error> {
        self.to_wire_line_at(Utc::now())
    }

    pub(crate) fn to_wire_line_at(&self, sent_at: DateTime<Utc>) -> Result<String, serde_json::Error> {
        let mut object = Map::with_capacity(self.fields.len() + 4);
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        object.insert("@timestamp".to_string(), Value::String(rfc3339(sent_at)));
        object.insert("timestamp".to_string(), Value::String(rfc3339(self.timestamp)));
        object.insert("level".to_string(), Value::String(self.level.as_str().to_string()));
        object.insert("message".to_string(), Value::String(self.message.clone()));

        let mut line = serde_json::to_string(&object)?;
        line.push('\n');
        Ok(line)
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
