//! Handlers, filters and the pipeline that chains them.
//!
//! # How a request travels
//!
//! A [`Pipeline`] is a stack of [`Filter`]s wrapped around one [`Handler`].
//! Every layer is type-erased into the same shape, so the whole stack is a
//! single `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }     ← user writes this
//!        ↓ Pipeline::builder().filter(a).filter(b).handler(hello)
//! Arc::new(FnHandler(hello))                         ← innermost
//!        ↓
//! Arc::new(Filtered { filter: b, next })             ← wraps the handler
//!        ↓
//! Arc::new(Filtered { filter: a, next })             ← outermost, called first
//!        ↓
//! pipeline.handle(req)  at request time              ← one vtable call per layer
//! ```
//!
//! Every layer resolves to a [`HandlerResult`]. An `Err` travels outwards
//! until an error filter such as
//! [`ErrorHandlerFilter`](crate::ErrorHandlerFilter) turns it into a
//! response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoHandlerResult, Response};
use crate::error::HandlerError;

// ── Internal types ────────────────────────────────────────────────────────────

/// What every handler and filter resolves to.
pub type HandlerResult = Result<Response, HandlerError>;

/// A heap-allocated, type-erased future that resolves to a [`HandlerResult`].
///
/// `Pin<Box<…>>` is required because the async runtime must be able to poll
/// the future in-place. `Send + 'static` let tokio move the future across
/// threads safely.
pub type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid request handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoHandlerResult
/// ```
///
/// which covers plain responses as well as `Result<impl IntoResponse, E>`
/// for any `E: Into<HandlerError>`.
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_handler_result() })
    }
}

// ── Filters ───────────────────────────────────────────────────────────────────

/// The rest of the pipeline, as seen from inside a filter.
///
/// Cheap to clone; a filter may call it zero or more times.
#[derive(Clone)]
pub struct Next(BoxedHandler);

impl Next {
    pub fn run(&self, req: Request) -> BoxFuture {
        self.0.call(req)
    }
}

/// A layer around the rest of the pipeline.
///
/// Implement it on a struct when the filter carries configuration, or use
/// [`filter_fn`] for a one-off closure.
pub trait Filter: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// Filter built from an async closure. Obtain via [`filter_fn`].
pub struct FilterFn<F>(F);

/// Turns an async closure into a [`Filter`].
///
/// ```rust
/// use tsu_log::{filter_fn, HandlerError, Next, Request};
///
/// let stamp = filter_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await?;
///     res.set_header("x-served-by", "tsu");
///     Ok::<_, HandlerError>(res)
/// });
/// # let _ = stamp;
/// ```
pub fn filter_fn<F, Fut>(f: F) -> FilterFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FilterFn(f)
}

impl<F, Fut> Filter for FilterFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin((self.0)(req, next))
    }
}

struct Filtered {
    filter: Arc<dyn Filter>,
    next: Next,
}

impl ErasedHandler for Filtered {
    fn call(&self, req: Request) -> BoxFuture {
        self.filter.call(req, self.next.clone())
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// A handler wrapped in zero or more filters. Build it once at startup.
#[derive(Clone)]
pub struct Pipeline {
    entry: BoxedHandler,
}

impl Pipeline {
    /// A pipeline with no filters.
    pub fn new(handler: impl Handler) -> Self {
        Self { entry: handler.into_boxed_handler() }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { filters: Vec::new() }
    }

    /// Runs one request through every filter and the handler.
    pub fn handle(&self, req: Request) -> BoxFuture {
        self.entry.call(req)
    }
}

/// Collects filters outermost-first, then closes over a handler.
pub struct PipelineBuilder {
    filters: Vec<Arc<dyn Filter>>,
}

impl PipelineBuilder {
    /// Adds a filter inside every filter added before it.
    pub fn filter(mut self, filter: impl Filter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn handler(self, handler: impl Handler) -> Pipeline {
        let entry = self.filters.into_iter().rev().fold(
            handler.into_boxed_handler(),
            |next, filter| -> BoxedHandler { Arc::new(Filtered { filter, next: Next(next) }) },
        );
        Pipeline { entry }
    }
}
