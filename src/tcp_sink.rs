use crate::diagnostics::Diagnostics;
use crate::record::LogRecord;
use crate::sink::LogSink;
use crate::transport::{AttemptState, TcpTransport, TransportConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;

/// Counters shared by every attempt of one [`TcpSink`].
///
/// `completed` always converges to `attempts`; a growing
/// `failed + timed_out` is the signal of a sustained aggregator outage.
#[derive(Clone, Debug, Default)]
pub struct TransportStats {
    /// Attempts started.
    pub attempts: Arc<AtomicU64>,
    /// Attempts that reached `Done`.
    pub delivered: Arc<AtomicU64>,
    /// Attempts refused, broken or unserializable.
    pub failed: Arc<AtomicU64>,
    /// Attempts that exceeded the configured bound.
    pub timed_out: Arc<AtomicU64>,
    /// Completion signals fired.
    pub completed: Arc<AtomicU64>,
}

/// Resolves once the attempt it belongs to is finished, whatever the
/// outcome. It says nothing about success.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<()>,
}

impl Completion {
    pub async fn wait(self) {
        // A dropped sender also means the attempt is over.
        let _ = self.rx.await;
    }
}

/// Fires at most once, either explicitly or when dropped, so error and
/// teardown paths collapse into a single notification.
struct CompletionSignal {
    tx: Option<oneshot::Sender<()>>,
    completed: Arc<AtomicU64>,
}

impl CompletionSignal {
    fn new(completed: Arc<AtomicU64>) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx), completed }, Completion { rx })
    }

    fn fire(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.completed.fetch_add(1, Ordering::Relaxed);
            let _ = tx.send(());
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Network [`LogSink`]: every delivered record becomes one independent
/// [`TcpTransport`] attempt spawned on the current Tokio runtime.
///
/// `deliver` returns as soon as the attempt is spawned. Failures end up as
/// a single diagnostic line per attempt and are otherwise dropped.
#[derive(Clone)]
pub struct TcpSink {
    transport: Arc<TcpTransport>,
    diagnostics: Diagnostics,
    stats: TransportStats,
}

impl TcpSink {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            transport: Arc::new(TcpTransport::new(config)),
            diagnostics: Diagnostics::default(),
            stats: TransportStats::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        self.transport.config()
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Start one delivery attempt for `record` and return its [`Completion`].
    ///
    /// Dropping the returned value does not cancel the attempt.
    pub fn dispatch(&self, record: Arc<LogRecord>) -> Completion {
        let (mut signal, completion) = CompletionSignal::new(Arc::clone(&self.stats.completed));
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.report(format!(
                    "log aggregator {}: no tokio runtime, dropping log record",
                    self.config().endpoint()
                ));
                signal.fire();
                return completion;
            }
        };

        let transport = Arc::clone(&self.transport);
        let diagnostics = self.diagnostics.clone();
        let stats = self.stats.clone();
        handle.spawn(async move {
            match transport.send(&record).await {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(endpoint = %transport.config().endpoint(), "log record shipped");
                }
                Err(e) => {
                    let counter = match e.terminal_state() {
                        AttemptState::TimedOut => &stats.timed_out,
                        _ => &stats.failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    diagnostics.report(format!(
                        "log aggregator {}: {}",
                        transport.config().endpoint(),
                        e
                    ));
                }
            }
            signal.fire();
        });

        completion
    }
}

impl LogSink for TcpSink {
    fn deliver(&self, record: &Arc<LogRecord>) {
        let _ = self.dispatch(Arc::clone(record));
    }
}
