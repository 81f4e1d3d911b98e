//! Centralized error dispatch registry
//!
//! [`ErrorManager`] routes errors to externally supplied handlers: an
//! ordered sequence per [`ErrorKind`] plus an ordered global sequence that
//! observes every error. It is an explicitly constructed object passed by
//! reference to the call sites that need it, not a process-wide singleton,
//! so lifecycle and test isolation stay under the caller's control.
//!
//! Dispatch is a terminal sink for observation (logging, alerting). It runs
//! after the caller already has the error in hand and never alters control
//! flow: [`ErrorManager::handle`] cannot fail, and a handler that panics is
//! caught, reported through `tracing`, and does not stop later handlers.
//! Observability of the original error is prioritized over surfacing
//! handler bugs.
//!
//! Registration, unregistration, and dispatch are safe under concurrent
//! access; handlers run sequentially within one `handle` call, never as a
//! parallel fan-out.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{BotError, ErrorKind, ErrorSeverity};

/// Caller-supplied context passed through to every handler unchanged.
pub type DispatchContext = Map<String, Value>;

/// A callable registered to observe errors of a given kind or globally.
///
/// Handlers borrow the error and context for the duration of the call only;
/// they take no ownership beyond it.
pub type ErrorHandler = Arc<dyn Fn(&BotError, &DispatchContext) + Send + Sync>;

#[derive(Default)]
struct Registry {
    by_kind: HashMap<ErrorKind, Vec<ErrorHandler>>,
    global: Vec<ErrorHandler>,
}

/// Registry dispatching errors to per-kind and global handlers.
///
/// Populated at startup by application code; cleared explicitly or dropped
/// on teardown. Interior mutability allows a shared reference (`&` or
/// `Arc`) to be used from concurrent tasks.
#[derive(Default)]
pub struct ErrorManager {
    registry: RwLock<Registry>,
}

impl ErrorManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the ordered sequence for `kind`.
    pub fn register(&self, kind: ErrorKind, handler: ErrorHandler) {
        self.registry.write().by_kind.entry(kind).or_default().push(handler);
        debug!(kind = %kind, "Registered error handler");
    }

    /// Append a handler to the global ordered sequence.
    pub fn register_global(&self, handler: ErrorHandler) {
        self.registry.write().global.push(handler);
        debug!("Registered global error handler");
    }

    /// Remove a specific handler for `kind` by identity.
    ///
    /// Identity is pointer equality on the handler `Arc`; a clone of the
    /// `Arc` passed to [`register`](Self::register) removes that exact
    /// registration. Returns whether a handler was removed.
    pub fn unregister(&self, kind: ErrorKind, handler: &ErrorHandler) -> bool {
        let mut registry = self.registry.write();
        let Some(handlers) = registry.by_kind.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() < before
    }

    /// Remove a specific global handler by identity.
    pub fn unregister_global(&self, handler: &ErrorHandler) -> bool {
        let mut registry = self.registry.write();
        let before = registry.global.len();
        registry.global.retain(|h| !Arc::ptr_eq(h, handler));
        registry.global.len() < before
    }

    /// Empty all registries.
    pub fn clear(&self) {
        let mut registry = self.registry.write();
        registry.by_kind.clear();
        registry.global.clear();
        debug!("Cleared all error handlers");
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: ErrorKind) -> usize {
        self.registry.read().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Number of global handlers.
    pub fn global_handler_count(&self) -> usize {
        self.registry.read().global.len()
    }

    /// Dispatch an error to its kind-specific handlers, then to the global
    /// handlers, each in registration order.
    ///
    /// Never fails. A panicking handler is caught and reported; the
    /// remaining handlers still run. The handler lists are snapshotted
    /// before dispatch, so a handler may register or unregister handlers
    /// without deadlocking (its changes apply to the next dispatch).
    pub fn handle(&self, error: &BotError, context: &DispatchContext) {
        let (kind_handlers, global_handlers) = {
            let registry = self.registry.read();
            (
                registry.by_kind.get(&error.kind()).cloned().unwrap_or_default(),
                registry.global.clone(),
            )
        };

        for handler in kind_handlers.iter().chain(global_handlers.iter()) {
            if catch_unwind(AssertUnwindSafe(|| handler(error, context))).is_err() {
                error!(code = error.code(), "Error handler panicked during dispatch");
            }
        }
    }
}

/// Prebuilt handler that logs `[code] message` plus dispatch context through
/// `tracing`, at a level chosen from the error's severity.
///
/// Register it globally for a centralized logging sink:
///
/// ```rust,ignore
/// let manager = ErrorManager::new();
/// manager.register_global(tracing_handler());
/// ```
pub fn tracing_handler() -> ErrorHandler {
    Arc::new(|err: &BotError, context: &DispatchContext| {
        let ctx = Value::Object(context.clone());
        match err.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                error!(code = err.code(), context = %ctx, "{err}");
            }
            ErrorSeverity::Warning => warn!(code = err.code(), context = %ctx, "{err}"),
            ErrorSeverity::Info => info!(code = err.code(), context = %ctx, "{err}"),
        }
    })
}
