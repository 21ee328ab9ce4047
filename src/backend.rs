use crate::console::{ConsoleSink, ConsoleTarget};
use crate::diagnostics::Diagnostics;
use crate::sink::LogSink;
use crate::tcp_sink::TcpSink;
use crate::transport::TransportConfig;
use std::str::FromStr;
use std::sync::Arc;

/// Sink implementations that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Console,
    Tcp,
}

/// Error type returned when a sink name is not recognized.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SinkParseError {
    #[error("unknown sink `{0}`")]
    Unknown(String),

    #[error("no sink configured")]
    Empty,
}

impl FromStr for SinkKind {
    type Err = SinkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "stdout" => Ok(SinkKind::Console),
            "tcp" | "logstash" => Ok(SinkKind::Tcp),
            other => Err(SinkParseError::Unknown(other.to_string())),
        }
    }
}

/// Parse a comma separated list such as `"tcp,console"`.
///
/// Order is kept and duplicates are dropped.
pub fn parse_sink_list(list: &str) -> Result<Vec<SinkKind>, SinkParseError> {
    let mut kinds = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind = name.parse::<SinkKind>()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(SinkParseError::Empty);
    }
    Ok(kinds)
}

/// Create the concrete [`LogSink`] for `kind`.
pub fn make_sink(kind: SinkKind, transport: &TransportConfig, diagnostics: &Diagnostics) -> Arc<dyn LogSink> {
    match kind {
        SinkKind::Console => {
            Arc::new(ConsoleSink::new(ConsoleTarget::Stdout).with_diagnostics(diagnostics.clone()))
        }
        SinkKind::Tcp => Arc::new(TcpSink::new(transport.clone()).with_diagnostics(diagnostics.clone())),
    }
}
