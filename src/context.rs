//! Request-scoped context.
//!
//! Every [`Request`](crate::Request) carries a [`RequestContext`]. Filters
//! further in use it to hand information back out to filters further out,
//! without touching the request or response values:
//!
//! ```text
//! RequestIdFilter      writes  request-id chain
//! LoggingFilter        reads   chain, error, pinned status
//! ErrorHandlerFilter   writes  error
//! InvalidRequestFilter writes  error, clears pinned status
//! application          writes  anything (principal, pinned status, …)
//! ```
//!
//! The context is a typed map behind an `Arc`. Cloning it is one atomic
//! increment and every clone sees the same slots. It is created fresh with
//! each request and dropped with the last clone, so nothing survives the
//! request.

use std::sync::Arc;

use http::Extensions;
use parking_lot::Mutex;

use crate::error::HandlerError;
use crate::request_id::RequestIdChain;
use crate::status::NormalizedStatus;

/// Per-request key/value store, keyed by type.
#[derive(Clone, Default)]
pub struct RequestContext {
    inner: Arc<Mutex<Slots>>,
}

#[derive(Default)]
struct Slots {
    extensions: Extensions,
    error: Option<Arc<HandlerError>>,
}

#[derive(Clone, Copy)]
struct PinnedStatus(NormalizedStatus);

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Typed slots ───────────────────────────────────────────────────────────

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.inner.lock().extensions.insert(value)
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.lock().extensions.get::<T>().cloned()
    }

    pub fn remove<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.inner.lock().extensions.remove::<T>()
    }

    // ── Request-id chain ──────────────────────────────────────────────────────

    pub fn request_id_chain(&self) -> Option<RequestIdChain> {
        self.get::<RequestIdChain>()
    }

    pub(crate) fn replace_request_id_chain(
        &self,
        chain: Option<RequestIdChain>,
    ) -> Option<RequestIdChain> {
        match chain {
            Some(chain) => self.insert(chain),
            None => self.remove::<RequestIdChain>(),
        }
    }

    // ── Error ─────────────────────────────────────────────────────────────────

    /// Records the error that ended this request. A later call replaces it.
    pub fn set_error(&self, err: HandlerError) {
        self.inner.lock().error = Some(Arc::new(err));
    }

    pub fn error(&self) -> Option<Arc<HandlerError>> {
        self.inner.lock().error.clone()
    }

    // ── Pinned status ─────────────────────────────────────────────────────────

    /// Fixes the normalized status of this request. The logging filter uses
    /// it instead of deriving one from the response status code.
    pub fn pin_status(&self, status: NormalizedStatus) {
        self.insert(PinnedStatus(status));
    }

    pub fn clear_pinned_status(&self) {
        self.remove::<PinnedStatus>();
    }

    pub fn pinned_status(&self) -> Option<NormalizedStatus> {
        self.get::<PinnedStatus>().map(|p| p.0)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.inner.lock();
        f.debug_struct("RequestContext")
            .field("extensions", &slots.extensions.len())
            .field("error", &slots.error.is_some())
            .finish()
    }
}
