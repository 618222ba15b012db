//! HTTP server and graceful shutdown.
//!
//! The server owns the socket and nothing else. Every request is buffered,
//! converted into a [`Request`] and handed to one [`Pipeline`]; what gets
//! logged, and how failures are answered, is decided by the pipeline's
//! filters.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`. No new connections are made.
//! 2. Letting every in-flight connection task run to completion, so every
//!    in-flight request still gets its log record.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::handler::Pipeline;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
///
/// ```rust,no_run
/// use tsu_log::{Config, Request, Response, Server, TracingSink, standard_filters};
///
/// #[tokio::main]
/// async fn main() -> Result<(), tsu_log::Error> {
///     let config = Config::default();
///     tsu_log::telemetry::init(&config.telemetry)?;
///
///     let app = standard_filters(&config, |_req: &Request| None::<String>, TracingSink::new(false))
///         .handler(|_req: Request| async { Response::text("hello world") });
///
///     Server::from_config(&config.server).serve(app).await
/// }
/// ```
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.addr)
    }

    /// Serves until SIGTERM or Ctrl-C, then drains in-flight requests.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        self.serve_with_shutdown(pipeline, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        pipeline: Pipeline,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        serve_listener(listener, pipeline, signal).await
    }
}

/// Serves on an already bound listener. Useful when binding to port 0.
pub async fn serve_listener(
    listener: TcpListener,
    pipeline: Pipeline,
    signal: impl Future<Output = ()>,
) -> Result<(), Error> {
    info!(addr = %listener.local_addr()?, "tsu-log listening");

    // Every spawned connection task, so shutdown can wait for all of them.
    let mut tasks = tokio::task::JoinSet::new();

    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Shutdown is checked first so it wins over queued connections.
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let pipeline = pipeline.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| dispatch(pipeline.clone(), req));

                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        warn!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the set stays small.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}

    info!("tsu-log stopped");
    Ok(())
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers one request and runs it through the pipeline.
///
/// Never fails towards hyper. A body that cannot be read is a client
/// problem and answers `400` before the pipeline runs; an error that made
/// it through every filter answers `500`.
async fn dispatch(
    pipeline: Pipeline,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(method = %parts.method, uri = %parts.uri, "could not read request body: {e}");
            let res = Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .text("Unexpected end of input");
            return Ok(res.into_inner());
        }
    };

    let res = match pipeline.handle(Request::from_parts(parts, body)).await {
        Ok(res) => res,
        Err(err) => {
            error!(error = %err, "unhandled error reached the server; is an error filter installed?");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text("Something went wrong")
        }
    };

    Ok(res.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by the Kubernetes
/// control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // Never resolves: on non-Unix platforms the SIGTERM arm is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
