/// How the engine reacts when a current-member accessor finds more than one
/// member pinned on the same hierarchy by a compound slicer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AlertPolicy {
    /// Return the first pinned member silently.
    Ignore,
    /// Return the first pinned member and log a warning.
    #[default]
    Warn,
    /// Fail the evaluation.
    Raise,
}

/// Per-execution evaluation settings, passed into the evaluator at
/// construction. There is no process-global configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalConfig {
    /// Maximum tuples a materialized set may hold; 0 means unlimited.
    pub result_limit: usize,
    pub slicer_alert: AlertPolicy,
}

impl EvalConfig {
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn with_slicer_alert(mut self, policy: AlertPolicy) -> Self {
        self.slicer_alert = policy;
        self
    }
}
