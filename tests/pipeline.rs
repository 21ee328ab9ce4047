use log_shipper::tcp_sink::TcpSink;
use log_shipper::transport::TransportConfig;
use log_shipper::{Diagnostics, Fields, Level, LogRecord, LogSink, Logger};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Aggregator that reads every connection to EOF, reports the payload and
/// closes, like a Logstash `tcp` input.
async fn spawn_aggregator() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut payload = String::new();
                if socket.read_to_string(&mut payload).await.is_ok() {
                    let _ = tx.send(payload);
                }
            });
        }
    });
    (port, rx)
}

/// Aggregator that accepts connections and never reads nor closes them.
async fn spawn_silent_aggregator() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            held.push(socket);
        }
    });
    port
}

async fn refusing_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn http_record() -> Arc<LogRecord> {
    let mut fields = Fields::new();
    fields.insert("service".into(), json!("web-service"));
    fields.insert("request_id".into(), json!("req_1700000000000_abcdefghi"));
    fields.insert("method".into(), json!("GET"));
    fields.insert("url".into(), json!("/dashboard"));
    fields.insert("status_code".into(), json!(200));
    fields.insert("execution_time".into(), json!(42));
    Arc::new(LogRecord::new(Level::Info, "HTTP Request", fields))
}

#[tokio::test]
async fn successful_attempt_completes_once_and_ships_one_line() {
    let (port, mut received) = spawn_aggregator().await;
    let (diagnostics, mut diag_rx) = Diagnostics::channel();
    let sink = TcpSink::new(TransportConfig::new("127.0.0.1", port)).with_diagnostics(diagnostics);

    sink.dispatch(http_record()).wait().await;

    let stats = sink.stats();
    assert_eq!(stats.completed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.delivered.load(Ordering::Relaxed), 1);
    assert!(diag_rx.try_recv().is_err());

    let payload = tokio::time::timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload.matches('\n').count(), 1);
    let wire: Value = serde_json::from_str(payload.trim_end()).unwrap();
    assert!(wire["@timestamp"].is_string());
    assert!(wire["timestamp"].is_string());
    assert_eq!(wire["level"], "info");
    assert_eq!(wire["service"], "web-service");
    assert_eq!(wire["method"], "GET");
    assert_eq!(wire["url"], "/dashboard");
    assert_eq!(wire["status_code"], 200);
    assert_eq!(wire["execution_time"], 42);
}

#[tokio::test]
async fn refused_attempt_completes_once_with_one_diagnostic() {
    let port = refusing_port().await;
    let (diagnostics, mut diag_rx) = Diagnostics::channel();
    let sink = TcpSink::new(TransportConfig::new("127.0.0.1", port)).with_diagnostics(diagnostics);

    sink.dispatch(http_record()).wait().await;

    let stats = sink.stats();
    assert_eq!(stats.completed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.timed_out.load(Ordering::Relaxed), 0);

    let line = diag_rx.try_recv().unwrap();
    assert!(line.contains(&format!("127.0.0.1:{port}")), "{line}");
    assert!(diag_rx.try_recv().is_err());
}

#[tokio::test]
async fn delayed_aggregator_times_out_once() {
    let port = spawn_silent_aggregator().await;
    let (diagnostics, mut diag_rx) = Diagnostics::channel();
    let sink = TcpSink::new(
        TransportConfig::new("127.0.0.1", port).with_timeout(Duration::from_millis(200)),
    )
    .with_diagnostics(diagnostics);

    sink.dispatch(http_record()).wait().await;

    let stats = sink.stats();
    assert_eq!(stats.completed.load(Ordering::Relaxed), 1);
    assert_eq!(stats.timed_out.load(Ordering::Relaxed), 1);
    assert_eq!(stats.failed.load(Ordering::Relaxed), 0);
    assert!(diag_rx.try_recv().unwrap().contains("timed out"));
    assert!(diag_rx.try_recv().is_err());
}

#[tokio::test]
async fn log_returns_before_the_network_timeout() {
    let port = spawn_silent_aggregator().await;
    let (diagnostics, mut diag_rx) = Diagnostics::channel();
    let timeout = Duration::from_millis(500);
    let sink = TcpSink::new(TransportConfig::new("127.0.0.1", port).with_timeout(timeout))
        .with_diagnostics(diagnostics.clone());
    let logger = Logger::builder()
        .service("web-service")
        .sink(Arc::new(sink))
        .diagnostics(diagnostics)
        .build();

    let started = Instant::now();
    logger.info("HTTP Request", [("request_id", json!("req_1"))]);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(diag_rx.try_recv().is_err());

    let line = tokio::time::timeout(Duration::from_secs(3), diag_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(started.elapsed() >= timeout);
    assert!(line.contains("timed out"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(diag_rx.try_recv().is_err());
}

#[tokio::test]
async fn log_survives_every_sink_failing() {
    let (diagnostics, mut diag_rx) = Diagnostics::channel();
    let first = TcpSink::new(TransportConfig::new("127.0.0.1", refusing_port().await))
        .with_diagnostics(diagnostics.clone());
    let second = TcpSink::new(TransportConfig::new("127.0.0.1", refusing_port().await))
        .with_diagnostics(diagnostics.clone());
    let logger = Logger::builder()
        .sink(Arc::new(first))
        .sink(Arc::new(second))
        .diagnostics(diagnostics)
        .build();

    logger.error("Unhandled error", [("error", json!("Database connection failed"))]);

    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(2), diag_rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn filtered_records_never_reach_the_network() {
    let (port, mut received) = spawn_aggregator().await;
    let sink = TcpSink::new(TransportConfig::new("127.0.0.1", port));
    let stats = sink.stats().clone();
    let logger = Logger::builder()
        .min_level(Level::Error)
        .sink(Arc::new(sink))
        .build();

    logger.info("dropped", Fields::new());
    assert_eq!(stats.attempts.load(Ordering::Relaxed), 0);

    logger.error("shipped", Fields::new());
    let payload = tokio::time::timeout(Duration::from_secs(2), received.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(payload.contains("\"message\":\"shipped\""));
    assert_eq!(stats.attempts.load(Ordering::Relaxed), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_emissions_each_get_their_own_connection() {
    let (port, mut received) = spawn_aggregator().await;
    let sink = Arc::new(TcpSink::new(TransportConfig::new("127.0.0.1", port)));
    let logger = Logger::builder().sink(sink.clone() as Arc<dyn LogSink>).build();

    let mut emitters = Vec::new();
    for i in 0..20 {
        let logger = logger.clone();
        emitters.push(tokio::spawn(async move {
            logger.info("HTTP Request", [("seq", json!(i))]);
        }));
    }
    for emitter in emitters {
        emitter.await.unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        let payload = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        let wire: Value = serde_json::from_str(payload.trim_end()).unwrap();
        seen.push(wire["seq"].as_u64().unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<u64>>());
    assert_eq!(sink.stats().attempts.load(Ordering::Relaxed), 20);
}
