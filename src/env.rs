//! Environment-driven configuration for services embedding the pipeline.
//!
//! These are purely helpers; [`Logger`], the sinks and the transport never
//! read the environment themselves.

use crate::backend::{make_sink, parse_sink_list, SinkKind, SinkParseError};
use crate::diagnostics::Diagnostics;
use crate::logger::Logger;
use crate::record::{Level, LevelParseError};
use crate::transport::{TransportConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT};
use std::time::Duration;

/// Aggregator host name, e.g. `logstash`.
pub const LOG_SHIPPER_HOST_ENV: &str = "LOG_SHIPPER_HOST";

/// Aggregator TCP port.
pub const LOG_SHIPPER_PORT_ENV: &str = "LOG_SHIPPER_PORT";

/// Per-attempt bound, in milliseconds.
pub const LOG_SHIPPER_TIMEOUT_MS_ENV: &str = "LOG_SHIPPER_TIMEOUT_MS";

/// Severity floor (`error`, `warn`, `info`, `debug`, `trace`).
pub const LOG_SHIPPER_MIN_LEVEL_ENV: &str = "LOG_SHIPPER_MIN_LEVEL";

/// `service` metadata merged into every record.
pub const LOG_SHIPPER_SERVICE_ENV: &str = "LOG_SHIPPER_SERVICE";

/// Comma separated sink list, e.g. `tcp,console`.
pub const LOG_SHIPPER_SINKS_ENV: &str = "LOG_SHIPPER_SINKS";

pub use crate::logger::DEFAULT_SERVICE;

/// Value of `key`, or `default` when it is unset or not valid unicode.
pub fn env_or(key: &str, default: &str) -> String {
    lookup_or(&|key: &str| std::env::var(key).ok(), key, default)
}

fn lookup_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Error type returned when an environment variable holds an unusable value.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var}: `{value}` is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var}: {source}")]
    Level {
        var: &'static str,
        #[source]
        source: LevelParseError,
    },

    #[error("{var}: {source}")]
    Sinks {
        var: &'static str,
        #[source]
        source: SinkParseError,
    },
}

/// Everything needed to build the process [`Logger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub transport: TransportConfig,
    pub min_level: Level,
    pub service: String,
    pub sinks: Vec<SinkKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            min_level: Level::Info,
            service: DEFAULT_SERVICE.to_string(),
            sinks: vec![SinkKind::Tcp, SinkKind::Console],
        }
    }
}

impl PipelineConfig {
    /// Read the `LOG_SHIPPER_*` variables, falling back to defaults for
    /// unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup_or(&lookup, LOG_SHIPPER_HOST_ENV, DEFAULT_HOST);

        let port = match lookup(LOG_SHIPPER_PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: LOG_SHIPPER_PORT_ENV,
                value: raw,
                expected: "TCP port",
            })?,
            None => DEFAULT_PORT,
        };

        let timeout = match lookup(LOG_SHIPPER_TIMEOUT_MS_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: LOG_SHIPPER_TIMEOUT_MS_ENV,
                        value: raw,
                        expected: "positive number of milliseconds",
                    })
                }
            },
            None => DEFAULT_TIMEOUT,
        };

        let min_level = match lookup(LOG_SHIPPER_MIN_LEVEL_ENV) {
            Some(raw) => raw.parse::<Level>().map_err(|source| ConfigError::Level {
                var: LOG_SHIPPER_MIN_LEVEL_ENV,
                source,
            })?,
            None => Level::Info,
        };

        let service = lookup_or(&lookup, LOG_SHIPPER_SERVICE_ENV, DEFAULT_SERVICE);

        let sinks = match lookup(LOG_SHIPPER_SINKS_ENV) {
            Some(raw) => parse_sink_list(&raw).map_err(|source| ConfigError::Sinks {
                var: LOG_SHIPPER_SINKS_ENV,
                source,
            })?,
            None => vec![SinkKind::Tcp, SinkKind::Console],
        };

        Ok(Self {
            transport: TransportConfig { host, port, timeout },
            min_level,
            service,
            sinks,
        })
    }

    /// Build the process [`Logger`] described by this configuration.
    pub fn logger(&self, diagnostics: Diagnostics) -> Logger {
        self.sinks
            .iter()
            .fold(
                Logger::builder()
                    .min_level(self.min_level)
                    .service(self.service.clone())
                    .diagnostics(diagnostics.clone()),
                |builder, kind| builder.sink(make_sink(*kind, &self.transport, &diagnostics)),
            )
            .build()
    }
}
