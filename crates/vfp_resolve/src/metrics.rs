// Metrics hooks for the `vfp_resolve` crate.
//
// Callers install a global `ResolveMetrics` implementation via
// [`set_resolve_metrics`], after which every `IdentityResolver::resolve` call
// reports its outcome. This keeps instrumentation decoupled from any specific
// metrics backend.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::types::MatchKind;

/// Metrics observer for resolution outcomes.
pub trait ResolveMetrics: Send + Sync {
    /// Record one finished resolution.
    ///
    /// `kind` is the terminal decision, `confidence` the score attached to
    /// it, `candidate_count` the number of fuzzy candidates retrieved (zero
    /// on the exact-hit fast path), and `latency` the wall-clock duration of
    /// the whole call.
    fn record_resolution(
        &self,
        kind: &MatchKind,
        confidence: f64,
        candidate_count: usize,
        latency: Duration,
    );
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn ResolveMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn ResolveMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn ResolveMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global resolve metrics recorder.
///
/// Typically called once during service startup so all resolver instances
/// share the same metrics backend.
pub fn set_resolve_metrics(recorder: Option<Arc<dyn ResolveMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
