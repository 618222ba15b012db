//! Structured, serialize-only snapshots of errors.
//!
//! An [`ErrorSnapshot`] is what lands under `throwable` in a log record:
//!
//! ```json
//! {
//!   "value": "app::db::QueryError: connection reset",
//!   "stackTrace": [{ "declaringUnit": "app::db", "functionName": "query", "sourceFile": "src/db.rs", "line": 42 }],
//!   "suppressed": [],
//!   "cause": { "value": "connection reset", "stackTrace": null, "suppressed": null, "cause": null }
//! }
//! ```
//!
//! Capturing is best effort and never fails. A `Display` impl or a
//! `source()` that panics leaves its field empty instead of taking the
//! request down, and the walk stops after [`MAX_DEPTH`] levels or when an
//! error shows up a second time in its own chain.

use std::error::Error as StdError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

use backtrace::{Backtrace, BacktraceSymbol};
use serde::Serialize;

use crate::error::HandlerError;

/// Deepest nesting of `cause` and `suppressed` recorded.
pub const MAX_DEPTH: usize = 32;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSnapshot {
    /// Rendered error. `None` if rendering panicked.
    pub value: Option<String>,
    pub stack_trace: Option<Vec<StackFrame>>,
    pub suppressed: Option<Vec<ErrorSnapshot>>,
    pub cause: Option<Box<ErrorSnapshot>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub declaring_unit: String,
    pub function_name: String,
    pub source_file: Option<String>,
    pub line: Option<u32>,
}

impl ErrorSnapshot {
    /// Snapshot of a handler error: type-qualified message, backtrace,
    /// suppressed errors and the `source()` chain.
    pub fn capture(err: &HandlerError) -> Self {
        Walk::default().handler_error(err, 0)
    }

    /// Snapshot of a plain error and its `source()` chain. No stack frames.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        Walk::default().error(err, 0)
    }

    /// Number of snapshots along the `cause` chain, this one included.
    pub fn chain_len(&self) -> usize {
        std::iter::successors(Some(self), |s| s.cause.as_deref()).count()
    }
}

#[derive(Default)]
struct Walk {
    /// Errors already on the path, compared by data pointer and vtable.
    visited: Vec<*const (dyn StdError + 'static)>,
}

impl Walk {
    fn handler_error(&mut self, err: &HandlerError, depth: usize) -> ErrorSnapshot {
        let root: &(dyn StdError + 'static) = err.get_ref();
        self.first_visit(root);

        let suppressed: Option<Vec<ErrorSnapshot>> = (depth + 1 < MAX_DEPTH).then(|| {
            err.suppressed().iter().map(|s| self.handler_error(s, depth + 1)).collect()
        });

        ErrorSnapshot {
            value: render(|| format!("{}: {}", err.type_name(), root)),
            stack_trace: stack_frames(err.backtrace()),
            suppressed,
            cause: self.cause_of(root, depth),
        }
    }

    fn error(&mut self, err: &(dyn StdError + 'static), depth: usize) -> ErrorSnapshot {
        self.first_visit(err);
        ErrorSnapshot {
            value: render(|| err.to_string()),
            stack_trace: None,
            suppressed: None,
            cause: self.cause_of(err, depth),
        }
    }

    fn cause_of(&mut self, err: &(dyn StdError + 'static), depth: usize) -> Option<Box<ErrorSnapshot>> {
        if depth + 1 >= MAX_DEPTH {
            return None;
        }
        let source = catch_unwind(AssertUnwindSafe(|| err.source())).ok().flatten()?;
        if self.seen(source) {
            return None;
        }
        Some(Box::new(self.error(source, depth + 1)))
    }

    fn first_visit(&mut self, err: &(dyn StdError + 'static)) {
        self.visited.push(err);
    }

    /// A wrapper and the error in its first field share an address, so the
    /// address alone is not an identity; the vtable tells them apart.
    fn seen(&self, err: &(dyn StdError + 'static)) -> bool {
        self.visited.iter().any(|&v| ptr::eq(v, err))
    }
}

fn render(f: impl FnOnce() -> String) -> Option<String> {
    catch_unwind(AssertUnwindSafe(f)).ok()
}

fn stack_frames(backtrace: &Backtrace) -> Option<Vec<StackFrame>> {
    let frames = catch_unwind(AssertUnwindSafe(|| {
        let mut resolved = backtrace.clone();
        resolved.resolve();
        resolved.frames().iter()
            .flat_map(|frame| frame.symbols())
            .filter_map(StackFrame::from_symbol)
            .skip_while(StackFrame::is_capture_machinery)
            .collect::<Vec<_>>()
    }))
    .ok()?;
    (!frames.is_empty()).then_some(frames)
}

impl StackFrame {
    fn from_symbol(symbol: &BacktraceSymbol) -> Option<Self> {
        let name = format!("{:#}", symbol.name()?);
        let (declaring_unit, function_name) = split_symbol(&name);
        Some(Self {
            declaring_unit: declaring_unit.to_owned(),
            function_name: function_name.to_owned(),
            source_file: symbol.filename().map(|p| p.display().to_string()),
            line: symbol.lineno(),
        })
    }

    fn is_capture_machinery(&self) -> bool {
        self.declaring_unit.starts_with("backtrace::")
            || self.declaring_unit.contains("tsu_log::error::HandlerError")
            || self.declaring_unit.contains("as core::convert::From<E>>")
    }
}

/// `a::b::c` → (`a::b`, `c`). A name without path is its own function.
fn split_symbol(name: &str) -> (&str, &str) {
    name.rsplit_once("::").unwrap_or(("", name))
}
