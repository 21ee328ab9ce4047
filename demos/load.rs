use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use log_shipper::noop_sink::NoopSink;
use log_shipper::Logger;

fn main() {
    let sink = NoopSink::default();
    let received = Arc::clone(&sink.received);
    let logger = Logger::builder()
        .service("load-test")
        .sink(Arc::new(sink))
        .build();

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        logger.info("load test record", [("iteration", json!(i))]);
        // Filtered out before reaching the sink.
        logger.debug("load test debug record", [("iteration", json!(i))]);
    }

    let elapsed = start.elapsed();
    println!(
        "emitted {} records ({} delivered) in {:?} (~{:.0} rec/s)",
        n,
        received.load(Ordering::Relaxed),
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
