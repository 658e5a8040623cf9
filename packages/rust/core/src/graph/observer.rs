/// Receives step notifications while a graph runs.
pub trait StepObserver: Send + Sync {
    /// Called before a step runs.
    fn step_started(&self, step: &str);
    /// Called after a step returns, with whether it succeeded.
    fn step_finished(&self, step: &str, ok: bool);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl StepObserver for SilentObserver {
    fn step_started(&self, _step: &str) {}
    fn step_finished(&self, _step: &str, _ok: bool) {}
}
