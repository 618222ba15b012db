//! Request-id chains.
//!
//! Every request gets a fresh UUID. When a request arrives on behalf of
//! another one (a nested call through the same pipeline, or a hop from a
//! trusted upstream that forwards its chain), the new id is appended to the
//! existing chain instead of starting over. The last id is always the
//! current request; the first is where the trace started.
//!
//! [`RequestIdFilter`] drives the lifecycle:
//!
//! 1. **Admit.** Extend the chain already on the context, else the trusted
//!    inbound header, else start a new one.
//! 2. **Activate.** Store it on the [`RequestContext`], mirror it into the
//!    [`diagnostic`](crate::diagnostic) scope and open a `request` span.
//! 3. **Release.** Restore the previous chain on the context and leave the
//!    diagnostic scope, on every exit path.
//!
//! The response carries the current id in `x-request-id`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::config::RequestIdConfig;
use crate::context::RequestContext;
use crate::diagnostic::{self, DiagnosticContext, REQUEST_ID_CHAIN_KEY};
use crate::handler::{BoxFuture, Filter, Next};
use crate::request::Request;

// ── RequestIdChain ────────────────────────────────────────────────────────────

/// Non-empty list of request ids, oldest first.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequestIdChain(Vec<Uuid>);

impl RequestIdChain {
    /// A chain holding one fresh id.
    pub fn new() -> Self {
        Self(vec![Uuid::new_v4()])
    }

    /// Builds a chain from existing ids. `None` if `ids` is empty.
    pub fn from_ids(ids: Vec<Uuid>) -> Option<Self> {
        (!ids.is_empty()).then_some(Self(ids))
    }

    /// A copy of this chain with one fresh id appended.
    pub fn extend(&self) -> Self {
        let mut ids = self.0.clone();
        ids.push(Uuid::new_v4());
        Self(ids)
    }

    /// The id of the current request: the last element.
    pub fn current(&self) -> Uuid {
        // Non-empty by construction.
        self.0[self.0.len() - 1]
    }

    pub fn ids(&self) -> &[Uuid] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }

    /// Always `false`; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Parses a comma-separated list of UUIDs, keeping the newest
    /// `max_len` entries. `None` if the list is empty or any entry is
    /// not a UUID.
    pub fn parse(value: &str, max_len: usize) -> Option<Self> {
        let ids = value.split(',')
            .map(|s| Uuid::parse_str(s.trim()).ok())
            .collect::<Option<Vec<_>>>()?;
        let skip = ids.len().saturating_sub(max_len);
        Self::from_ids(ids.into_iter().skip(skip).collect())
    }
}

impl Default for RequestIdChain {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for RequestIdChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

// ── RequestIdFilter ───────────────────────────────────────────────────────────

/// Admits each request into a request-id chain. Must sit outside
/// [`LoggingFilter`](crate::LoggingFilter).
#[derive(Clone, Default)]
pub struct RequestIdFilter {
    config: Arc<RequestIdConfig>,
}

impl RequestIdFilter {
    pub fn new(config: RequestIdConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    fn admit(&self, req: &Request, previous: Option<&RequestIdChain>) -> RequestIdChain {
        if let Some(chain) = previous {
            return chain.extend();
        }
        self.inbound(req).map_or_else(RequestIdChain::new, |chain| chain.extend())
    }

    fn inbound(&self, req: &Request) -> Option<RequestIdChain> {
        let header = self.config.inbound_chain_header.as_deref()?;
        let value = req.header(header)?;
        let chain = RequestIdChain::parse(value, self.config.max_inbound_len);
        if chain.is_none() {
            warn!(header, value, "ignoring malformed inbound request-id chain");
        }
        chain
    }
}

impl Filter for RequestIdFilter {
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let ctx = req.context().clone();
        let previous = ctx.request_id_chain();
        let chain = self.admit(&req, previous.as_ref());
        let response_header = self.config.response_header.clone();

        Box::pin(async move {
            let request_id = chain.current();
            let diagnostics = DiagnosticContext::current()
                .with(REQUEST_ID_CHAIN_KEY, chain.to_string());

            ctx.replace_request_id_chain(Some(chain));
            let _restore = RestoreChain { ctx, previous };

            let span = info_span!("request", request_id = %request_id);
            let mut res = diagnostic::scope(diagnostics, next.run(req))
                .instrument(span)
                .await?;

            res.set_header(&response_header, request_id.to_string());
            Ok(res)
        })
    }
}

/// Puts the outer chain back when the filter's future finishes or unwinds.
struct RestoreChain {
    ctx: RequestContext,
    previous: Option<RequestIdChain>,
}

impl Drop for RestoreChain {
    fn drop(&mut self) {
        self.ctx.replace_request_id_chain(self.previous.take());
    }
}
