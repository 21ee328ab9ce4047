use crate::record::LogRecord;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::trace;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and how long a [`TcpTransport`] tries to deliver a record.
///
/// **Fields**
/// - `host`: aggregator hostname or address.
/// - `port`: aggregator TCP port.
/// - `timeout`: bound on one whole attempt, from connect to peer close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lifecycle of one delivery attempt.
///
/// `Idle -> Connecting -> Connected -> Writing -> Closing -> Done` on
/// success; any state may jump to `TimedOut` or `Failed`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Connecting,
    Connected,
    Writing,
    Closing,
    Done,
    TimedOut,
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Done | AttemptState::TimedOut | AttemptState::Failed)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Idle => "idle",
            AttemptState::Connecting => "connecting",
            AttemptState::Connected => "connected",
            AttemptState::Writing => "writing",
            AttemptState::Closing => "closing",
            AttemptState::Done => "done",
            AttemptState::TimedOut => "timed out",
            AttemptState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a delivery attempt ended without reaching `Done`.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {after:?} while {state}")]
    Timeout { state: AttemptState, after: Duration },

    #[error("i/o error while {state}: {source}")]
    Io {
        state: AttemptState,
        #[source]
        source: io::Error,
    },

    #[error("record is not representable on the wire: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Terminal [`AttemptState`] this error leaves the attempt in.
    pub fn terminal_state(&self) -> AttemptState {
        match self {
            TransportError::Timeout { .. } => AttemptState::TimedOut,
            _ => AttemptState::Failed,
        }
    }
}

/// Ships serialized records to a line-oriented TCP aggregator
/// (Logstash `tcp` input with `json_lines` codec and the like).
///
/// Every call is one self-contained attempt on its own connection: no
/// pooling, no retry, no queue.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Serialize `record` and deliver it in a single bounded attempt.
    ///
    /// **Returns**
    /// - `Ok(())` once the payload was written, the write side half-closed
    ///   and the peer closed its side.
    /// - `Err(..)` on refusal, timeout, I/O failure or serialization
    ///   failure. The connection is already torn down when this returns.
    pub async fn send(&self, record: &LogRecord) -> Result<(), TransportError> {
        let payload = record.to_wire_line()?;
        self.send_payload(payload.as_bytes()).await
    }

    /// Deliver an already framed payload in a single bounded attempt.
    pub async fn send_payload(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut attempt = Attempt::new(&self.config);
        let result = attempt.run(payload).await;
        if let Err(e) = &result {
            attempt.enter(e.terminal_state());
        }
        result
    }
}

struct Attempt<'a> {
    config: &'a TransportConfig,
    state: AttemptState,
    deadline: Instant,
}

impl<'a> Attempt<'a> {
    fn new(config: &'a TransportConfig) -> Self {
        Self {
            config,
            state: AttemptState::Idle,
            deadline: Instant::now() + config.timeout,
        }
    }

    fn enter(&mut self, next: AttemptState) {
        trace!(
            host = %self.config.host,
            port = self.config.port,
            from = %self.state,
            to = %next,
            "transport attempt state"
        );
        self.state = next;
    }

    // The stream lives in this frame only: every early return drops it,
    // which aborts the connection and releases the socket.
    async fn run(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.deadline = Instant::now() + self.config.timeout;

        self.enter(AttemptState::Connecting);
        let host = self.config.host.as_str();
        let mut stream = self
            .bounded(TcpStream::connect((host, self.config.port)))
            .await?;
        self.enter(AttemptState::Connected);

        self.enter(AttemptState::Writing);
        self.bounded(async {
            stream.write_all(payload).await?;
            stream.flush().await
        })
        .await?;

        self.enter(AttemptState::Closing);
        self.bounded(async {
            stream.shutdown().await?;
            await_peer_close(&mut stream).await
        })
        .await?;

        self.enter(AttemptState::Done);
        Ok(())
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T, TransportError>
    where
        F: Future<Output = io::Result<T>>,
    {
        match timeout_at(self.deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) if self.state == AttemptState::Connecting => Err(TransportError::Connect {
                endpoint: self.config.endpoint(),
                source,
            }),
            Ok(Err(source)) => Err(TransportError::Io {
                state: self.state,
                source,
            }),
            Err(_) => Err(TransportError::Timeout {
                state: self.state,
                after: self.config.timeout,
            }),
        }
    }
}

async fn await_peer_close(stream: &mut TcpStream) -> io::Result<()> {
    let mut buf = [0u8; 512];
    loop {
        if stream.read(&mut buf).await? == 0 {
            return Ok(());
        }
    }
}
