//! Global atomic counters for BlockBench observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on daemon shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no allocation or locking.
pub struct Metrics {
    runs_submitted: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    version_transitions: AtomicU64,
    explain_traces: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_submitted: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            version_transitions: AtomicU64::new(0),
            explain_traces: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_submitted(&self) {
        self.runs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_submitted", "counter incremented");
    }

    /// Count a terminal run outcome.
    pub fn inc_run_outcome(&self, success: bool) {
        let (counter, name) = if success {
            (&self.runs_succeeded, "runs_succeeded")
        } else {
            (&self.runs_failed, "runs_failed")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_version_transitions(&self) {
        self.version_transitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "version_transitions", "counter incremented");
    }

    pub fn inc_explain_traces(&self) {
        self.explain_traces.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "explain_traces", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_submitted = self.runs_submitted(),
            runs_succeeded = self.runs_succeeded(),
            runs_failed = self.runs_failed(),
            version_transitions = self.version_transitions(),
            explain_traces = self.explain_traces(),
        );
    }

    pub fn runs_submitted(&self) -> u64 {
        self.runs_submitted.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> u64 {
        self.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn version_transitions(&self) -> u64 {
        self.version_transitions.load(Ordering::Relaxed)
    }

    pub fn explain_traces(&self) -> u64 {
        self.explain_traces.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_submitted.store(0, Ordering::Relaxed);
        self.runs_succeeded.store(0, Ordering::Relaxed);
        self.runs_failed.store(0, Ordering::Relaxed);
        self.version_transitions.store(0, Ordering::Relaxed);
        self.explain_traces.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_split_by_success() {
        let m = Metrics::new();
        m.inc_runs_submitted();
        m.inc_runs_submitted();
        m.inc_run_outcome(true);
        m.inc_run_outcome(false);
        m.inc_run_outcome(false);
        assert_eq!(m.runs_submitted(), 2);
        assert_eq!(m.runs_succeeded(), 1);
        assert_eq!(m.runs_failed(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_version_transitions();
        m.inc_explain_traces();
        m.inc_runs_submitted();
        m.reset();
        assert_eq!(m.version_transitions(), 0);
        assert_eq!(m.explain_traces(), 0);
        assert_eq!(m.runs_submitted(), 0);
    }
}
