//! Error types.
//!
//! Two kinds of failure live here and they never mix:
//!
//! - [`Error`] is what tsu-log's own fallible operations return: binding a
//!   socket, parsing configuration, installing the tracing subscriber.
//! - [`HandlerError`] is what a handler or filter returns when a request
//!   fails. It never reaches the client; the error filters put it on the
//!   request context for the log record and answer with a generic response.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;

use backtrace::Backtrace;
use thiserror::Error;

/// The error type returned by tsu-log's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("telemetry: {0}")]
    Telemetry(String),
}

// ── HandlerError ──────────────────────────────────────────────────────────────

/// A failure raised while handling a request.
///
/// Wraps any `std::error::Error + Send + Sync`, remembers the concrete type
/// name, and captures an unresolved backtrace at construction. Symbol
/// resolution is deferred until a log record actually needs the frames.
///
/// `HandlerError` does not implement `std::error::Error`, so
/// that `?` converts any error into it:
///
/// ```rust
/// use tsu_log::{HandlerError, Request, Response};
///
/// async fn parse(req: Request) -> Result<Response, HandlerError> {
///     let n: u32 = std::str::from_utf8(req.body())?.trim().parse()?;
///     Ok(Response::text(format!("{}", n * 2)))
/// }
/// ```
pub struct HandlerError {
    inner: Box<dyn StdError + Send + Sync + 'static>,
    type_name: &'static str,
    backtrace: Backtrace,
    suppressed: Vec<HandlerError>,
}

impl HandlerError {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::build(Box::new(err), std::any::type_name::<E>())
    }

    /// An error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::build(Box::new(Message(message.into())), "tsu_log::HandlerError")
    }

    /// Wraps an already boxed error. The concrete type name is lost.
    pub fn from_boxed(err: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self::build(err, "dyn std::error::Error")
    }

    /// Converts a panic payload caught by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_owned()
        };
        Self::build(Box::new(Panicked(message)), "panic")
    }

    fn build(inner: Box<dyn StdError + Send + Sync + 'static>, type_name: &'static str) -> Self {
        Self {
            inner,
            type_name,
            backtrace: Backtrace::new_unresolved(),
            suppressed: Vec::new(),
        }
    }

    /// Attaches an error that was raised while this one was being handled,
    /// e.g. a failing cleanup step.
    pub fn with_suppressed(mut self, other: impl Into<HandlerError>) -> Self {
        self.suppressed.push(other.into());
        self
    }

    pub fn type_name(&self) -> &'static str { self.type_name }
    pub fn suppressed(&self) -> &[HandlerError] { &self.suppressed }
    pub fn backtrace(&self) -> &Backtrace { &self.backtrace }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Iterates the wrapped error and its `source()` chain.
    ///
    /// Stops after 32 links so a self-referencing `source()` cannot spin.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let root: &(dyn StdError + 'static) = &*self.inner;
        std::iter::successors(Some(root), |&e| e.source()).take(32)
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("type_name", &self.type_name)
            .field("inner", &self.inner)
            .field("suppressed", &self.suppressed)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

#[derive(Debug, Error)]
#[error("handler panicked: {0}")]
struct Panicked(String);

// ── InvalidRequest ────────────────────────────────────────────────────────────

/// Malformed input detected before the handler could produce a status.
///
/// Return it (or anything whose root is it) from a handler and
/// [`InvalidRequestFilter`](crate::InvalidRequestFilter) answers
/// `400 Bad Request` through its renderer.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{kind} {location} `{name}`")]
pub struct InvalidRequest {
    pub kind: InvalidKind,
    pub location: &'static str,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvalidKind {
    Missing,
    Invalid,
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
        })
    }
}

impl InvalidRequest {
    pub fn missing(location: &'static str, name: impl Into<String>) -> Self {
        Self { kind: InvalidKind::Missing, location, name: name.into() }
    }

    pub fn invalid(location: &'static str, name: impl Into<String>) -> Self {
        Self { kind: InvalidKind::Invalid, location, name: name.into() }
    }
}
