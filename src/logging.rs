//! One structured log record per request.
//!
//! [`LoggingFilter`] times the rest of the pipeline, then assembles a
//! [`RequestResponseLog`] from the request, the response and whatever inner
//! filters left on the [`RequestContext`](crate::RequestContext), and hands
//! it to a [`LogSink`] exactly once before returning the response.
//!
//! ```text
//! RequestIdFilter ─► CatchAllFilter ─► LoggingFilter ─► ErrorHandlerFilter ─► InvalidRequestFilter ─► app
//!        │                                  │                   │                      │
//!        └── chain on context ──────────────┤                   └── error on context ──┘
//!                                           └── reads chain, error, pinned status; emits record
//! ```
//!
//! The filter never shapes the response. It only observes.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capture::{HeaderLog, cap_body, redact_headers, should_capture};
use crate::config::{Config, LoggingConfig};
use crate::errors::{CatchAllFilter, ErrorHandlerFilter, InvalidRequestFilter, JsonErrorRenderer};
use crate::handler::{BoxFuture, Filter, Handler, Next, Pipeline, PipelineBuilder};
use crate::request::Request;
use crate::request_id::{RequestIdChain, RequestIdFilter};
use crate::response::Response;
use crate::snapshot::ErrorSnapshot;
use crate::status::{NormalizedStatus, classify};

/// Target of the events written by [`TracingSink`]. Log pipelines route on
/// it, so it must not change.
pub const LOG_TARGET: &str = "tsu_log::logging";

// ── Records ───────────────────────────────────────────────────────────────────

/// Everything known about one completed request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponseLog<P> {
    /// When the record was built.
    pub timestamp: DateTime<Utc>,
    /// Same as the last element of `request_id_chain`.
    pub request_id: Uuid,
    pub request_id_chain: RequestIdChain,
    pub request: RequestLog,
    pub response: ResponseLog,
    pub principal: Option<P>,
    pub duration_ms: u64,
    pub throwable: Option<ErrorSnapshot>,
    pub status: Option<NormalizedStatus>,
    /// Name of the worker thread that finished the request.
    pub thread: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// When the request entered the logging filter.
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub uri: String,
    pub headers: Vec<HeaderLog>,
    /// Declared `content-length`, else the buffered length. Bodies are always
    /// buffered, so this is set even when `body` is not captured.
    pub size: Option<usize>,
    pub body: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLog {
    /// When the response came back to the logging filter.
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub headers: Vec<HeaderLog>,
    /// Declared `content-length`, else the buffered length. Bodies are always
    /// buffered, so this is set even when `body` is not captured.
    pub size: Option<usize>,
    pub body: Option<String>,
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Receives finished records. Called synchronously on the request task.
///
/// Implemented for any `Fn(RequestResponseLog<P>)`. A sink must not panic;
/// buffering or shipping elsewhere is its own business.
pub trait LogSink<P>: Send + Sync + 'static {
    fn emit(&self, record: RequestResponseLog<P>);
}

impl<P, F> LogSink<P> for F
where
    F: Fn(RequestResponseLog<P>) + Send + Sync + 'static,
{
    fn emit(&self, record: RequestResponseLog<P>) {
        self(record)
    }
}

/// Writes each record as one `tracing` event on [`LOG_TARGET`].
///
/// The record is serialized to JSON in the `request_info` field. Requests
/// that failed with an error are logged at `ERROR`, the rest at `INFO`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink {
    print_stacktrace: bool,
}

impl TracingSink {
    /// With `print_stacktrace`, the error of a failed request is also
    /// printed to stderr, which is easier to read during local development.
    pub fn new(print_stacktrace: bool) -> Self {
        Self { print_stacktrace }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(config.print_stacktrace)
    }
}

impl<P: Serialize + 'static> LogSink<P> for TracingSink {
    fn emit(&self, record: RequestResponseLog<P>) {
        let message = format!(
            "HTTP request ({}) ({} ms): {} {}",
            record.response.status_code,
            record.duration_ms,
            record.request.method,
            record.request.uri,
        );

        let request_info = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, "{message} (record not serializable)");
                return;
            }
        };

        match &record.throwable {
            Some(_) => error!(target: LOG_TARGET, request_info = %request_info, "{message}"),
            None => info!(target: LOG_TARGET, request_info = %request_info, "{message}"),
        }

        if let (true, Some(throwable)) = (self.print_stacktrace, &record.throwable) {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(
                stderr,
                "Error from request {} {}:",
                record.request.method, record.request.uri
            );
            let _ = write_trace(&mut stderr, throwable);
        }
    }
}

/// Writes a snapshot the way a panic message reads: value, frames, then
/// each cause and suppressed error indented below it.
pub(crate) fn write_trace(out: &mut impl Write, snapshot: &ErrorSnapshot) -> io::Result<()> {
    write_trace_at(out, snapshot, "", 0)
}

fn write_trace_at(
    out: &mut impl Write,
    snapshot: &ErrorSnapshot,
    label: &str,
    indent: usize,
) -> io::Result<()> {
    let pad = "    ".repeat(indent);
    let value = snapshot.value.as_deref().unwrap_or("<unrenderable error>");
    writeln!(out, "{pad}{label}{value}")?;
    for frame in snapshot.stack_trace.iter().flatten() {
        let file = frame.source_file.as_deref().unwrap_or("?");
        let line = frame.line.map_or_else(|| "?".to_owned(), |l| l.to_string());
        writeln!(out, "{pad}    at {}::{} ({file}:{line})", frame.declaring_unit, frame.function_name)?;
    }
    for suppressed in snapshot.suppressed.iter().flatten() {
        write_trace_at(out, suppressed, "Suppressed: ", indent + 1)?;
    }
    if let Some(cause) = &snapshot.cause {
        write_trace_at(out, cause, "Caused by: ", indent)?;
    }
    Ok(())
}

// ── LoggingFilter ─────────────────────────────────────────────────────────────

type PrincipalFn<P> = dyn Fn(&Request) -> Option<P> + Send + Sync;

/// Builds and emits a [`RequestResponseLog`] for every request.
///
/// # Panics
///
/// The returned future panics if no [`RequestIdFilter`] runs further out:
/// a request without a chain is a wiring mistake, not a request problem.
pub struct LoggingFilter<P> {
    inner: Arc<Inner<P>>,
}

struct Inner<P> {
    config: LoggingConfig,
    principal: Box<PrincipalFn<P>>,
    sink: Box<dyn LogSink<P>>,
}

impl<P: Send + 'static> LoggingFilter<P> {
    /// `principal` runs after the handler, so filters further in may have
    /// put the authenticated identity on the request context by then.
    pub fn new(
        config: LoggingConfig,
        principal: impl Fn(&Request) -> Option<P> + Send + Sync + 'static,
        sink: impl LogSink<P>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                principal: Box::new(principal),
                sink: Box::new(sink),
            }),
        }
    }
}

impl<P> Clone for LoggingFilter<P> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<P: Send + 'static> Filter for LoggingFilter<P> {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let chain = req.context().request_id_chain()
                .expect("LoggingFilter needs a RequestIdFilter further out in the pipeline");

            let started_at = Utc::now();
            let started = Instant::now();

            let res = next.run(req.clone()).await?;

            let ended_at = Utc::now();
            let elapsed = started.elapsed();

            let record = inner.build(&req, &res, chain, (started_at, ended_at), elapsed);
            inner.sink.emit(record);

            Ok(res)
        })
    }
}

impl<P> Inner<P> {
    fn build(
        &self,
        req: &Request,
        res: &Response,
        chain: RequestIdChain,
        (started_at, ended_at): (DateTime<Utc>, DateTime<Utc>),
        elapsed: Duration,
    ) -> RequestResponseLog<P> {
        let ctx = req.context();
        let config = &self.config;

        let request_body = self.capture_body(req.content_type(), req.body());
        let response_body = self.capture_body(res.content_type(), res.body());

        RequestResponseLog {
            timestamp: Utc::now(),
            request_id: chain.current(),
            request_id_chain: chain,
            request: RequestLog {
                timestamp: started_at,
                method: req.method().to_string(),
                uri: req.uri().to_owned(),
                headers: redact_headers(req.headers(), &config.redacted_headers),
                size: Some(req.content_length().unwrap_or(req.body().len())),
                body: request_body,
            },
            response: ResponseLog {
                timestamp: ended_at,
                status_code: res.status_code().as_u16(),
                headers: redact_headers(res.headers(), &config.redacted_headers),
                size: Some(res.content_length().unwrap_or(res.body().len())),
                body: response_body,
            },
            principal: (self.principal)(req),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            throwable: ctx.error().map(|err| ErrorSnapshot::capture(&err)),
            status: Some(ctx.pinned_status().unwrap_or_else(|| classify(res.status_code().as_u16()))),
            thread: thread_name(),
        }
    }

    fn capture_body(&self, content_type: Option<&str>, body: &[u8]) -> Option<String> {
        let config = &self.config;
        let wanted = config.include_body
            && should_capture(content_type, &config.content_types, config.capture_without_content_type);
        wanted.then(|| cap_body(&String::from_utf8_lossy(body), config.max_body_bytes))
    }
}

fn thread_name() -> String {
    let thread = std::thread::current();
    thread.name().map_or_else(|| format!("{:?}", thread.id()), str::to_owned)
}

// ── Assembly ──────────────────────────────────────────────────────────────────

/// The recommended filter stack, outermost first:
/// `RequestIdFilter`, `CatchAllFilter`, `LoggingFilter`, `ErrorHandlerFilter`,
/// `InvalidRequestFilter`. Add application filters, then the handler.
///
/// ```rust
/// use tsu_log::{Config, Request, Response, TracingSink, standard_filters};
///
/// let config = Config::default();
/// let pipeline = standard_filters(&config, |_req: &Request| None::<()>, TracingSink::new(false))
///     .handler(|_req: Request| async { Response::text("hello world") });
/// # let _ = pipeline;
/// ```
pub fn standard_filters<P: Send + 'static>(
    config: &Config,
    principal: impl Fn(&Request) -> Option<P> + Send + Sync + 'static,
    sink: impl LogSink<P>,
) -> PipelineBuilder {
    Pipeline::builder()
        .filter(RequestIdFilter::new(config.request_id.clone()))
        .filter(CatchAllFilter)
        .filter(LoggingFilter::new(config.logging.clone(), principal, sink))
        .filter(ErrorHandlerFilter)
        .filter(InvalidRequestFilter::new(JsonErrorRenderer))
}

/// [`standard_filters`] closed over `handler`, for apps without filters of
/// their own.
pub fn standard_pipeline<P: Send + 'static>(
    config: &Config,
    principal: impl Fn(&Request) -> Option<P> + Send + Sync + 'static,
    sink: impl LogSink<P>,
    handler: impl Handler,
) -> Pipeline {
    standard_filters(config, principal, sink).handler(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::status::NormalizedStatusCode;
    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    type Records = Arc<Mutex<Vec<RequestResponseLog<String>>>>;

    fn collecting() -> (Records, impl LogSink<String>) {
        let records: Records = Arc::default();
        let sink = {
            let records = Arc::clone(&records);
            move |record: RequestResponseLog<String>| records.lock().push(record)
        };
        (records, sink)
    }

    fn pipeline(
        config: LoggingConfig,
        sink: impl LogSink<String>,
        handler: impl crate::Handler,
    ) -> Pipeline {
        Pipeline::builder()
            .filter(RequestIdFilter::default())
            .filter(LoggingFilter::new(config, |_req: &Request| Some("alice".to_owned()), sink))
            .filter(ErrorHandlerFilter)
            .handler(handler)
    }

    #[tokio::test]
    async fn get_hello_world_produces_one_record() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |_req: Request| async {
            Response::builder().body("hello world")
        });

        let res = pipeline.handle(Request::new(Method::GET, "/some/url")).await.unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);

        let records = records.lock();
        assert_eq!(records.len(), 1);
        let record = &records[0];

        assert_eq!(record.principal.as_deref(), Some("alice"));
        assert_eq!(record.request.method, "GET");
        assert_eq!(record.request.uri, "/some/url");
        assert_eq!(record.request.body.as_deref(), Some(""));
        assert_eq!(record.request.size, Some(0));
        assert_eq!(record.response.status_code, 200);
        assert_eq!(record.response.body.as_deref(), Some("hello world"));
        assert_eq!(record.response.size, Some(11));
        assert_eq!(record.status.map(|s| s.code()), Some(NormalizedStatusCode::Ok));
        assert!(record.request_id_chain.len() >= 1);
        assert_eq!(record.request_id, record.request_id_chain.current());
        assert!(record.throwable.is_none());
        assert!(!record.thread.is_empty());
        assert!(record.request.timestamp <= record.response.timestamp);
        assert!(record.response.timestamp <= record.timestamp);
    }

    #[tokio::test]
    async fn authorization_header_is_redacted_by_default() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |_req: Request| async {
            Response::text("ok")
        });

        let req = Request::new(Method::GET, "/")
            .with_header("authorization", "my very secret value");
        pipeline.handle(req).await.unwrap();

        let records = records.lock();
        let auth: Vec<_> = records[0].request.headers.iter()
            .filter(|h| h.name.eq_ignore_ascii_case("authorization"))
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].value.as_deref(), Some("*REDACTED*"));
    }

    #[tokio::test]
    async fn bodies_outside_the_allowlist_are_not_captured() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |_req: Request| async {
            Response::builder().bytes(crate::ContentType::Html, "<p>hi</p>")
        });

        let req = Request::new(Method::POST, "/")
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(r#"{"name":"alice"}"#);
        pipeline.handle(req).await.unwrap();

        let record = &records.lock()[0];
        assert_eq!(record.request.body.as_deref(), Some(r#"{"name":"alice"}"#));
        assert_eq!(record.response.body, None);
        assert_eq!(record.response.size, Some(9));
    }

    #[tokio::test]
    async fn include_body_false_disables_capture() {
        let (records, sink) = collecting();
        let config = LoggingConfig { include_body: false, ..LoggingConfig::default() };
        let pipeline = pipeline(config, sink, |_req: Request| async { Response::json("{}") });

        pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();

        let record = &records.lock()[0];
        assert_eq!(record.request.body, None);
        assert_eq!(record.response.body, None);
        assert_eq!(record.request.size, Some(0));
        assert_eq!(record.response.size, Some(2));
    }

    #[tokio::test]
    async fn oversized_bodies_are_capped_with_configured_limit() {
        let (records, sink) = collecting();
        let config = LoggingConfig { max_body_bytes: 4, ..LoggingConfig::default() };
        let pipeline = pipeline(config, sink, |_req: Request| async {
            Response::json(r#"{"long":true}"#)
        });

        pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();

        let record = &records.lock()[0];
        assert_eq!(record.response.body.as_deref(), Some(r#"{"lo**CAPPED**"#));
        assert_eq!(record.response.size, Some(13));
    }

    #[tokio::test]
    async fn handler_errors_are_recorded_but_not_leaked() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |_req: Request| async {
            Err::<Response, _>(std::io::Error::other("database password is hunter2"))
        });

        let res = pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.body_string().contains("hunter2"));

        let record = &records.lock()[0];
        let throwable = record.throwable.as_ref().unwrap();
        assert!(throwable.value.as_deref().unwrap().contains("hunter2"));
        assert_eq!(record.status, Some(NormalizedStatus::InternalServerError));
    }

    #[tokio::test]
    async fn pinned_status_wins_over_the_status_code() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |req: Request| async move {
            req.context().pin_status(NormalizedStatus::ServiceUnavailable);
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        });

        pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();

        assert_eq!(records.lock()[0].status, Some(NormalizedStatus::ServiceUnavailable));
    }

    #[tokio::test]
    async fn independent_requests_get_distinct_ids() {
        let (records, sink) = collecting();
        let pipeline = pipeline(LoggingConfig::default(), sink, |_req: Request| async {
            Response::text("same")
        });

        pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();
        pipeline.handle(Request::new(Method::GET, "/")).await.unwrap();

        let records = records.lock();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].request_id, records[1].request_id);
        assert_eq!(records[0].status, records[1].status);
    }

    #[tokio::test]
    #[should_panic(expected = "RequestIdFilter")]
    async fn missing_chain_is_a_wiring_error() {
        let (_records, sink) = collecting();
        let pipeline = Pipeline::builder()
            .filter(LoggingFilter::new(LoggingConfig::default(), |_req: &Request| None, sink))
            .handler(|_req: Request| async { Response::text("ok") });

        let _ = pipeline.handle(Request::new(Method::GET, "/")).await;
    }

    #[tokio::test]
    async fn unintercepted_errors_pass_through_without_a_record() {
        let (records, sink) = collecting();
        let pipeline = Pipeline::builder()
            .filter(RequestIdFilter::default())
            .filter(LoggingFilter::new(LoggingConfig::default(), |_req: &Request| None, sink))
            .handler(|_req: Request| async { Err::<Response, _>(HandlerError::msg("raw")) });

        assert!(pipeline.handle(Request::new(Method::GET, "/")).await.is_err());
        assert!(records.lock().is_empty());
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let chain = RequestIdChain::new();
        let now = Utc::now();
        let record = RequestResponseLog::<()> {
            timestamp: now,
            request_id: chain.current(),
            request_id_chain: chain,
            request: RequestLog {
                timestamp: now,
                method: "GET".into(),
                uri: "/example".into(),
                headers: Vec::new(),
                size: None,
                body: None,
            },
            response: ResponseLog {
                timestamp: now,
                status_code: 200,
                headers: Vec::new(),
                size: None,
                body: None,
            },
            principal: None,
            duration_ms: 10,
            throwable: None,
            status: Some(NormalizedStatus::Ok),
            thread: "dummy".into(),
        };

        let json = serde_json::to_value(&record).unwrap();

        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "durationMs", "principal", "request", "requestId", "requestIdChain",
                "response", "status", "thread", "throwable", "timestamp",
            ]
        );
        assert_eq!(json["request"]["uri"], "/example");
        assert_eq!(json["response"]["statusCode"], 200);
        assert_eq!(json["status"]["code"], "OK");
        assert_eq!(json["requestIdChain"][0], json["requestId"]);
    }

    #[test]
    fn trace_lists_causes_and_suppressed() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let err = HandlerError::new(Outer(std::io::Error::other("inner")))
            .with_suppressed(std::io::Error::other("cleanup"));
        let mut out = Vec::new();
        write_trace(&mut out, &ErrorSnapshot::capture(&err)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.lines().next().unwrap().ends_with("Outer: outer"));
        assert!(text.contains("    Suppressed: std::io::error::Error: cleanup"));
        assert!(text.contains("Caused by: inner"));
    }
}
