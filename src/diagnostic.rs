//! Ambient diagnostic context.
//!
//! Log statements deep inside a handler rarely have the request at hand.
//! The diagnostic context gives them the current request-id chain anyway:
//!
//! ```rust
//! if let Some(chain) = tsu_log::diagnostic::request_id_chain() {
//!     tracing::debug!(request_id_chain = %chain, "cache miss");
//! }
//! ```
//!
//! The store is task-local, not thread-local: tokio moves tasks between
//! worker threads at every `.await`, so a thread-local would leak values
//! into whatever task runs next on that thread. A value is visible only
//! inside [`scope`], which [`RequestIdFilter`](crate::RequestIdFilter)
//! wraps around the rest of the pipeline. Leaving the scope restores the
//! outer value (or none), whether the inner future completed, returned an
//! error, panicked, or was dropped.

use std::future::Future;

/// Key under which the request-id chain is stored.
pub const REQUEST_ID_CHAIN_KEY: &str = "requestIdChain";

tokio::task_local! {
    static DIAGNOSTIC_CONTEXT: DiagnosticContext;
}

/// An immutable set of key/value pairs visible to the current task.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticContext {
    entries: Vec<(&'static str, String)>,
}

impl DiagnosticContext {
    /// The context of the enclosing scope, or an empty one.
    pub fn current() -> Self {
        DIAGNOSTIC_CONTEXT.try_with(Clone::clone).unwrap_or_default()
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }
}

/// Runs `fut` with `context` as the current diagnostic context.
pub async fn scope<F: Future>(context: DiagnosticContext, fut: F) -> F::Output {
    DIAGNOSTIC_CONTEXT.scope(context, fut).await
}

/// Looks up `key` in the current task's diagnostic context.
pub fn get(key: &str) -> Option<String> {
    DIAGNOSTIC_CONTEXT.try_with(|ctx| ctx.get(key).map(str::to_owned)).ok().flatten()
}

/// The current request-id chain, comma separated, oldest first.
pub fn request_id_chain() -> Option<String> {
    get(REQUEST_ID_CHAIN_KEY)
}
