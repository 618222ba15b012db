//! Filters that turn failures into responses.
//!
//! | filter                   | catches                         | answers                   | stores error |
//! |--------------------------|---------------------------------|---------------------------|--------------|
//! | [`ErrorHandlerFilter`]   | any `Err`                       | 400 on truncated input, else 500 | yes   |
//! | [`InvalidRequestFilter`] | `Err` whose root is [`InvalidRequest`] | renderer's bad request | yes    |
//! | [`CatchAllFilter`]       | panics and stray `Err`s         | 500                       | no           |
//!
//! The first two sit inside [`LoggingFilter`](crate::LoggingFilter) so the
//! record can pick the error up from the request context. The catch-all
//! sits outside it and only exists so a bug never drops the connection.
//!
//! None of them ever put the error's message in the response body.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use serde_json::json;
use tracing::{debug, error};

use crate::error::{HandlerError, InvalidKind, InvalidRequest};
use crate::handler::{BoxFuture, Filter, Next};
use crate::request::Request;
use crate::response::Response;

fn server_error(body: &'static str) -> Response {
    Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).text(body)
}

// ── ErrorHandlerFilter ────────────────────────────────────────────────────────

/// Converts every handler error into a generic response and keeps the
/// error on the request context for logging.
///
/// A request whose body ended early answers `400 Unexpected end of input`.
/// Everything else answers `500 Something went wrong.`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ErrorHandlerFilter;

impl Filter for ErrorHandlerFilter {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let ctx = req.context().clone();
        Box::pin(async move {
            let err = match next.run(req).await {
                Ok(res) => return Ok(res),
                Err(err) => err,
            };

            let res = if is_unexpected_eof(&err) {
                Response::builder().status(StatusCode::BAD_REQUEST).text("Unexpected end of input")
            } else {
                server_error("Something went wrong.")
            };
            debug!(error = %err, status = res.status_code().as_u16(), "handler error converted");
            ctx.set_error(err);
            Ok(res)
        })
    }
}

fn is_unexpected_eof(err: &HandlerError) -> bool {
    err.chain().any(|e| {
        e.downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::UnexpectedEof)
    })
}

// ── InvalidRequestFilter ──────────────────────────────────────────────────────

/// Renders the response for a request that failed validation.
pub trait BadRequestRenderer: Send + Sync + 'static {
    fn bad_request(&self, failure: &InvalidRequest) -> Response;
}

/// Answers `400` with a JSON body naming the offending parameter:
///
/// ```json
/// {"message":"Missing/invalid parameters","params":[{"name":"page","type":"query","reason":"Invalid"}]}
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonErrorRenderer;

impl BadRequestRenderer for JsonErrorRenderer {
    fn bad_request(&self, failure: &InvalidRequest) -> Response {
        let reason = match failure.kind {
            InvalidKind::Missing => "Missing",
            InvalidKind::Invalid => "Invalid",
        };
        let body = json!({
            "message": "Missing/invalid parameters",
            "params": [{
                "name": failure.name,
                "type": failure.location,
                "reason": reason,
            }],
        });
        Response::builder().status(StatusCode::BAD_REQUEST).json(body.to_string())
    }
}

/// Answers validation failures through a [`BadRequestRenderer`].
///
/// The failure is stored on the context and any pinned status is cleared,
/// so the log record classifies the request by the `400` it actually got.
/// Other errors pass through untouched.
pub struct InvalidRequestFilter {
    renderer: Arc<dyn BadRequestRenderer>,
}

impl InvalidRequestFilter {
    pub fn new(renderer: impl BadRequestRenderer) -> Self {
        Self { renderer: Arc::new(renderer) }
    }
}

impl Default for InvalidRequestFilter {
    fn default() -> Self {
        Self::new(JsonErrorRenderer)
    }
}

impl Filter for InvalidRequestFilter {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let ctx = req.context().clone();
        let renderer = Arc::clone(&self.renderer);
        Box::pin(async move {
            match next.run(req).await {
                Err(err) => {
                    let Some(failure) = err.downcast_ref::<InvalidRequest>().cloned() else {
                        return Err(err);
                    };
                    let res = renderer.bad_request(&failure);
                    ctx.set_error(err);
                    ctx.clear_pinned_status();
                    Ok(res)
                }
                ok => ok,
            }
        })
    }
}

// ── CatchAllFilter ────────────────────────────────────────────────────────────

/// Last line of defence: a panic or an unconverted error anywhere further
/// in becomes `500 Something went wrong`.
///
/// Logs at `ERROR` itself, because a request that ends here never reaches
/// the logging filter's sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct CatchAllFilter;

impl Filter for CatchAllFilter {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let method = req.method().clone();
        let uri = req.uri().to_owned();
        Box::pin(async move {
            let err = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(Ok(res)) => return Ok(res),
                Ok(Err(err)) => err,
                Err(panic) => HandlerError::from_panic(panic),
            };
            error!(%method, %uri, error = %err, type_name = err.type_name(), "request failed outside error handling");
            Ok(server_error("Something went wrong"))
        })
    }
}
