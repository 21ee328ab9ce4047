use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use log_shipper::env::{env_or, PipelineConfig};
use log_shipper::init::{init_tracing_with_config, LayerConfig};
use log_shipper::middleware::{instrument_requests, RequestContext};
use log_shipper::{Diagnostics, Logger};

async fn home(State(logger): State<Logger>, Extension(ctx): Extension<RequestContext>) -> Json<Value> {
    logger.info("Home page accessed", [("request_id", json!(ctx.request_id))]);
    Json(json!({
        "message": "Web Service is running",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "web-service",
    }))
}

async fn dashboard(State(logger): State<Logger>, Extension(ctx): Extension<RequestContext>) -> Json<Value> {
    logger.info("Dashboard accessed", [("request_id", json!(ctx.request_id))]);

    // Follow-up record emitted after the response has gone out.
    let follow_up = logger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        follow_up.info(
            "Dashboard data loaded",
            [
                ("request_id", json!(ctx.request_id)),
                ("data_source", json!("api-service")),
                ("load_time", json!(150)),
            ],
        );
    });

    Json(json!({
        "dashboard": "Main Dashboard",
        "widgets": ["users", "orders", "analytics"],
        "loaded_at": Utc::now().to_rfc3339(),
    }))
}

async fn error_test(
    State(logger): State<Logger>,
    Extension(ctx): Extension<RequestContext>,
) -> (StatusCode, Json<Value>) {
    logger.error(
        "Simulated error occurred",
        [
            ("request_id", json!(ctx.request_id)),
            ("error_type", json!("simulation")),
            ("error_code", json!("SIM_001")),
        ],
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Simulated error for testing" })),
    )
}

async fn panic_test() -> &'static str {
    panic!("Database connection failed")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // LOG_SHIPPER_HOST=logstash LOG_SHIPPER_SERVICE=web-service cargo run --example web_service
    let config = PipelineConfig::from_env()?;
    let logger = config.logger(Diagnostics::Stderr);
    // `tracing` events from dependencies and handlers go through the same sinks.
    init_tracing_with_config(logger.clone(), LayerConfig { enable_stdout: false })?;

    let app = Router::new()
        .route("/", get(home))
        .route("/dashboard", get(dashboard))
        .route("/error-test", get(error_test))
        .route("/panic", get(panic_test))
        .layer(axum::middleware::from_fn_with_state(logger.clone(), instrument_requests))
        .with_state(logger.clone());

    let port: u16 = env_or("PORT", "3000").parse()?;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    logger.info("Web service started", [("port", json!(port))]);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
