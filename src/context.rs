use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cron::Schedule;
use tokio::time::Instant;

use crate::limits::RunLimits;

/// Cancellation token shared between the loop and whoever may stop it
/// (signal tasks, other tasks, tests).
///
/// Setting the flag is advisory: the loop only observes it at its defined
/// checkpoints, so work already in progress always runs to completion.
/// The flag is monotonic; once set it stays set for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Calling this more than once has the same
    /// effect as calling it once.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live state of one daemon loop run.
///
/// Created by the controller right before the loop starts and mutated only
/// by it (plus the cancellation flag, which any `CancelFlag` clone can set).
/// Holds the validated limits and the counters that the stop condition and
/// the post-run summary read. Discarded at the end of the run; nothing is
/// persisted.
#[derive(Debug)]
pub struct ExecutionContext {
    limits: RunLimits,
    started_at: Instant,
    iterations: u64,
    total_pause_seconds: u64,
    cancel: CancelFlag,
}

impl ExecutionContext {
    pub(crate) fn new(limits: RunLimits, cancel: CancelFlag) -> Self {
        Self {
            limits,
            started_at: Instant::now(),
            iterations: 0,
            total_pause_seconds: 0,
            cancel,
        }
    }

    /// Pause between iterations in seconds. Validation guarantees this is
    /// non-negative; the type stays signed so the pause step can keep its
    /// own contract check.
    pub fn pause_seconds(&self) -> i64 {
        self.limits.pause_seconds
    }

    /// Memory limit in bytes, `None` when unlimited.
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        self.limits.memory_limit_bytes
    }

    /// Wall-clock time limit in seconds, if configured.
    pub fn time_limit_seconds(&self) -> Option<u64> {
        self.limits.time_limit_seconds
    }

    /// Iteration count limit, if configured.
    pub fn iterations_limit(&self) -> Option<u64> {
        self.limits.iterations_limit
    }

    /// Cron schedule gating each iteration, if configured.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.limits.schedule.as_ref()
    }

    /// Number of completed iterations so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Seconds spent in inter-iteration pauses (schedule waits not included).
    pub fn total_pause_seconds(&self) -> u64 {
        self.total_pause_seconds
    }

    /// Wall-clock seconds since the run started, rounded to millisecond
    /// precision.
    pub fn elapsed_seconds(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        (elapsed * 1000.0).round() / 1000.0
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_set()
    }

    /// Clone of the run's cancellation token.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn increment_iterations(&mut self) {
        self.iterations += 1;
    }

    pub fn add_pause(&mut self, seconds: u64) {
        self.total_pause_seconds += seconds;
    }

    /// Mark the run for cooperative termination at the next checkpoint.
    pub fn request_cancellation(&self) {
        self.cancel.set();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(RunLimits::default(), CancelFlag::new())
    }

    #[tokio::test]
    async fn counters_start_at_zero() {
        let ctx = context();
        assert_eq!(ctx.iterations(), 0);
        assert_eq!(ctx.total_pause_seconds(), 0);
        assert!(!ctx.cancel_requested());
    }

    #[tokio::test]
    async fn increment_and_pause_accumulate() {
        let mut ctx = context();
        ctx.increment_iterations();
        ctx.increment_iterations();
        ctx.add_pause(3);
        ctx.add_pause(2);
        assert_eq!(ctx.iterations(), 2);
        assert_eq!(ctx.total_pause_seconds(), 5);
    }

    #[tokio::test]
    async fn cancellation_is_idempotent() {
        let ctx = context();
        ctx.request_cancellation();
        assert!(ctx.cancel_requested());
        ctx.request_cancellation();
        assert!(ctx.cancel_requested());
    }

    #[tokio::test]
    async fn cancel_flag_clone_observes_the_same_run() {
        let ctx = context();
        let flag = ctx.cancel_flag();
        flag.set();
        assert!(ctx.cancel_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_is_rounded_to_milliseconds() {
        let ctx = context();
        tokio::time::advance(Duration::from_micros(1_500_400)).await;
        assert_eq!(ctx.elapsed_seconds(), 1.5);
    }
}
