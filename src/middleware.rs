//! Per-request instrumentation for axum services.
//!
//! [`instrument_requests`] assigns every inbound request a correlation id,
//! times it, and emits exactly one record through the [`Logger`] when the
//! request ends: `HTTP Request` once the response body has been fully
//! produced (at `error` when the body fails partway), `Unhandled error` when
//! the handler panics, `HTTP Request aborted` when the request future or the
//! response body is dropped before finishing.

use crate::logger::Logger;
use crate::record::Level;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures_util::FutureExt;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use rand::Rng;
use serde_json::{json, Value};
use std::any::Any;
use std::backtrace::Backtrace;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Correlation data for one request, available to handlers through
/// request extensions.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub start: Instant,
}

/// `req_<unix millis>_<9 base36 chars>`. Unique in practice, not guaranteed.
pub fn generate_request_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("req_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// axum middleware; install with
/// `axum::middleware::from_fn_with_state(logger, instrument_requests)`.
pub async fn instrument_requests(
    State(logger): State<Logger>,
    mut req: Request,
    next: Next,
) -> Response {
    let context = RequestContext {
        request_id: generate_request_id(),
        start: Instant::now(),
    };
    req.extensions_mut().insert(context.clone());

    let mut observation = Observation {
        logger,
        context,
        method: req.method().to_string(),
        url: req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string()),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        finished: false,
    };

    // HEAD bodies are discarded without being polled.
    let is_head = req.method() == Method::HEAD;

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) if is_head => {
            observation.completed(response.status(), None);
            response
        }
        Ok(response) => {
            let status = response.status();
            response.map(|inner| {
                Body::new(ObservedBody {
                    inner,
                    status,
                    observation: Some(observation),
                })
            })
        }
        Err(panic) => {
            observation.panicked(panic_message(panic.as_ref()));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// The single observation point of a request. Whichever of `completed`,
/// `panicked` or `Drop` runs first emits; the others do nothing.
struct Observation {
    logger: Logger,
    context: RequestContext,
    method: String,
    url: String,
    user_agent: Option<String>,
    ip: Option<String>,
    finished: bool,
}

impl Observation {
    fn elapsed_ms(&self) -> u64 {
        self.context.start.elapsed().as_millis() as u64
    }

    /// `body_error` is set when the response body failed after the status
    /// line went out.
    fn completed(&mut self, status: StatusCode, body_error: Option<String>) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        let mut fields = vec![
            ("request_id", json!(self.context.request_id)),
            ("method", json!(self.method)),
            ("url", json!(self.url)),
            ("status_code", json!(status.as_u16())),
            ("execution_time", json!(self.elapsed_ms())),
        ];
        if let Some(user_agent) = &self.user_agent {
            fields.push(("user_agent", json!(user_agent)));
        }
        if let Some(ip) = &self.ip {
            fields.push(("ip", json!(ip)));
        }
        let level = match body_error {
            Some(error) => {
                fields.push(("error", Value::String(error)));
                Level::Error
            }
            None => Level::Info,
        };
        self.logger.log(level, "HTTP Request", fields);
    }

    fn panicked(&mut self, error: String) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        // Captured regardless of RUST_BACKTRACE.
        let stack = Backtrace::force_capture().to_string();
        self.logger.log(
            Level::Error,
            "Unhandled error",
            [
                ("request_id", json!(self.context.request_id)),
                ("error", Value::String(error)),
                ("stack", Value::String(stack)),
            ],
        );
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        self.logger.log(
            Level::Warn,
            "HTTP Request aborted",
            [
                ("request_id", json!(self.context.request_id)),
                ("method", json!(self.method)),
                ("url", json!(self.url)),
                ("execution_time", json!(self.elapsed_ms())),
            ],
        );
    }
}

/// Response body that reports the request once its last frame is produced.
struct ObservedBody {
    inner: Body,
    status: StatusCode,
    observation: Option<Observation>,
}

impl ObservedBody {
    fn finish(&mut self, body_error: Option<String>) {
        if let Some(mut observation) = self.observation.take() {
            observation.completed(self.status, body_error);
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let polled = Pin::new(&mut self.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => self.finish(None),
            Poll::Ready(Some(Err(e))) => {
                let error = e.to_string();
                self.finish(Some(error));
            }
            Poll::Ready(Some(Ok(_))) if self.inner.is_end_stream() => self.finish(None),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        // Bodies known to be empty are never polled by the server.
        if self.inner.is_end_stream() {
            self.finish(None);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
