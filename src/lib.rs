//! # tsu-log
//!
//! Request/response logging for HTTP services built on hyper.
//!
//! Every request that goes through the pipeline produces exactly one
//! structured record: method, uri, redacted headers, capped bodies, status,
//! duration, the authenticated principal, the error that broke it (if any)
//! and the chain of request ids that led to it.
//!
//! ## The pipeline
//!
//! A [`Pipeline`] is a handler wrapped in [`Filter`]s. The order matters:
//!
//! ```text
//! RequestIdFilter        admits the request into an id chain, sets x-request-id
//!   CatchAllFilter       panics → 500, so the connection survives
//!     LoggingFilter      times the rest, builds and emits the record
//!       ErrorHandlerFilter    any Err → 400/500, error kept for the record
//!         InvalidRequestFilter  InvalidRequest → renderer's 400
//!           your filters
//!             your handler
//! ```
//!
//! [`standard_filters`] assembles exactly that stack.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_log::{Config, HandlerError, InvalidRequest, Request, Response, Server, TracingSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_log::Error> {
//!     let config = Config::load("tsu-log.toml")?;
//!     tsu_log::telemetry::init(&config.telemetry)?;
//!
//!     let sink = TracingSink::from_config(&config.logging);
//!     let app = tsu_log::standard_filters(&config, |req: &Request| req.context().get::<User>(), sink)
//!         .handler(greet);
//!
//!     Server::from_config(&config.server).serve(app).await
//! }
//!
//! #[derive(Clone, serde::Serialize)]
//! struct User { name: String }
//!
//! async fn greet(req: Request) -> Result<Response, HandlerError> {
//!     let name = req.header("x-name").ok_or_else(|| InvalidRequest::missing("header", "x-name"))?;
//!     Ok(Response::text(format!("hello {name}")))
//! }
//! ```

mod capture;
mod config;
mod context;
mod error;
mod errors;
mod handler;
mod logging;
mod request;
mod request_id;
mod response;
mod server;
mod snapshot;
mod status;

pub mod diagnostic;
pub mod telemetry;

pub use capture::{CAPPED_MARKER, HeaderLog, REDACTED, cap_body, redact_headers, should_capture};
pub use config::{
    Config, DEFAULT_MAX_BODY_BYTES, LogFormat, LoggingConfig, RequestIdConfig, ServerConfig,
    TelemetryConfig,
};
pub use context::RequestContext;
pub use error::{Error, HandlerError, InvalidKind, InvalidRequest};
pub use errors::{BadRequestRenderer, CatchAllFilter, ErrorHandlerFilter, InvalidRequestFilter, JsonErrorRenderer};
pub use handler::{BoxFuture, Filter, FilterFn, Handler, HandlerResult, Next, Pipeline, PipelineBuilder, filter_fn};
pub use logging::{
    LOG_TARGET, LogSink, LoggingFilter, RequestLog, RequestResponseLog, ResponseLog, TracingSink,
    standard_filters, standard_pipeline,
};
pub use request::{Header, Request};
pub use request_id::{RequestIdChain, RequestIdFilter};
pub use response::{ContentType, IntoHandlerResult, IntoResponse, Response, ResponseBuilder};
pub use server::{Server, serve_listener, shutdown_signal};
pub use snapshot::{ErrorSnapshot, MAX_DEPTH, StackFrame};
pub use status::{ClientErrorCategory, NormalizedStatus, NormalizedStatusCode, classify, classify_raw};
