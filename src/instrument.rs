use std::env;
use std::sync::Arc;

use crate::log::{debug, error};
use crate::request::Exchange;

/// Sink for request lifecycle events.
///
/// Events are named `<instrumentor_name>.<suffix>` with suffixes
/// `request` (per attempt), `retry` (before an idempotent re-attempt),
/// and `error` (before an error is surfaced to the caller).
pub trait Instrumentor: Send + Sync {
    fn instrument(&self, event: &str, exchange: &Exchange);
}

/// Instrumentor that forwards events to the `log` crate. Errors log at
/// error level, everything else at debug.
pub struct StandardInstrumentor;

impl Instrumentor for StandardInstrumentor {
    fn instrument(&self, event: &str, exchange: &Exchange) {
        if event.ends_with(".error") {
            error!("{} {:?}", event, exchange);
        } else {
            debug!("{} {:?}", event, exchange);
        }
    }
}

/// The standard instrumentor when the environment asks for one.
pub(crate) fn from_env() -> Option<Arc<dyn Instrumentor>> {
    if env::var_os("WIRECALL_DEBUG").is_some()
        || env::var_os("WIRECALL_STANDARD_INSTRUMENTOR").is_some()
    {
        Some(Arc::new(StandardInstrumentor))
    } else {
        None
    }
}
