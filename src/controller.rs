use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{CancelFlag, ExecutionContext};
use crate::error::{IterationError, LoopError};
use crate::event::{ContextSnapshot, EventSender, IterationEvent};
use crate::limits::LoopOptions;
use crate::memory::{MemoryProbe, ProcMemory};
use crate::summary::RunSummary;

/// Granularity of schedule-wait sleeps. Cancellation stays responsive
/// within this bound even while waiting for a future scheduled time.
const SCHEDULE_WAIT_CHUNK: Duration = Duration::from_secs(1);

type Hook = Box<dyn FnMut(&ExecutionContext) + Send>;

/// Drives a caller-supplied unit of work in a loop until a stop condition
/// fires: cancellation, iteration limit, time limit, or memory limit.
///
/// The controller validates the raw options, builds the run's
/// [`ExecutionContext`], installs cooperative cancellation, and runs the
/// iterate / check-stop / pause cycle, optionally gated by a cron
/// schedule. Behavior is injected, not inherited: the iteration operation
/// and the before/after-cycle hooks are plain closures.
///
/// One controller drives one run; `run` consumes it.
pub struct LoopController {
    options: LoopOptions,
    run_id: String,
    probe: Arc<dyn MemoryProbe>,
    before_cycle: Option<Hook>,
    after_cycle: Option<Hook>,
    subscribers: Vec<EventSender>,
    signals: bool,
    cancel: CancelFlag,
}

impl LoopController {
    pub fn new(options: LoopOptions) -> Self {
        Self {
            options,
            run_id: Uuid::new_v4().to_string(),
            probe: Arc::new(ProcMemory),
            before_cycle: None,
            after_cycle: None,
            subscribers: Vec::new(),
            signals: true,
            cancel: CancelFlag::new(),
        }
    }

    /// Hook invoked once before the first cycle.
    pub fn before_cycle(mut self, hook: impl FnMut(&ExecutionContext) + Send + 'static) -> Self {
        self.before_cycle = Some(Box::new(hook));
        self
    }

    /// Hook invoked once after the loop terminates normally. Skipped when
    /// the run ends with an error.
    pub fn after_cycle(mut self, hook: impl FnMut(&ExecutionContext) + Send + 'static) -> Self {
        self.after_cycle = Some(Box::new(hook));
        self
    }

    /// Register a subscriber to receive an [`IterationEvent`] after each
    /// completed iteration. Subscribers whose receiver is gone are dropped
    /// silently.
    pub fn subscribe(mut self, sender: EventSender) -> Self {
        self.subscribers.push(sender);
        self
    }

    /// Replace the memory probe used for the stop condition and the
    /// environment ceiling check.
    pub fn memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Whether to install SIGTERM/SIGINT handlers at startup (default:
    /// true). With registration off, cancellation comes only from
    /// [`CancelFlag`] clones.
    pub fn register_signals(mut self, enabled: bool) -> Self {
        self.signals = enabled;
        self
    }

    /// Clone of the run's cancellation token, for cancelling from outside
    /// the loop.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Identity of this run, carried by every emitted event.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the loop to completion.
    ///
    /// `iteration` is invoked once per cycle with the live context; it runs
    /// to completion once started, and any error it returns propagates
    /// immediately as [`LoopError::IterationFailure`]. On normal
    /// termination the summary is logged and returned.
    pub async fn run<I, Fut>(mut self, mut iteration: I) -> Result<RunSummary, LoopError>
    where
        I: FnMut(&ExecutionContext) -> Fut,
        Fut: Future<Output = Result<(), IterationError>>,
    {
        let limits = self.options.validate(self.probe.as_ref())?;
        let mut context = ExecutionContext::new(limits, self.cancel.clone());

        if self.signals {
            install_signal_handlers(self.cancel.clone())?;
        }

        if let Some(hook) = self.before_cycle.as_mut() {
            hook(&context);
        }

        debug!(run_id = %self.run_id, "daemon loop starting");
        loop {
            if self.wait_for_schedule(&context).await {
                debug!(run_id = %self.run_id, "stop condition met while waiting for schedule");
                break;
            }

            iteration(&context)
                .await
                .map_err(LoopError::IterationFailure)?;
            context.increment_iterations();

            let stopping = self.check_stop(&context);
            self.notify(&context, stopping);
            if stopping {
                break;
            }

            self.pause(&mut context).await?;
        }

        if let Some(hook) = self.after_cycle.as_mut() {
            hook(&context);
        }

        let summary = RunSummary {
            elapsed_seconds: context.elapsed_seconds(),
            total_pause_seconds: context.total_pause_seconds(),
            memory_bytes: self.probe.usage_bytes(),
            iterations: context.iterations(),
        };
        info!(run_id = %self.run_id, "Total execution time: {}s", summary.elapsed_seconds);
        if summary.total_pause_seconds > 0 {
            info!(run_id = %self.run_id, "Total pause time: {}s", summary.total_pause_seconds);
        }
        info!(run_id = %self.run_id, "Memory usage: {}MB", summary.memory_megabytes());
        info!(run_id = %self.run_id, "Iterations count: {}", summary.iterations);
        Ok(summary)
    }

    /// Block until the schedule's next run time is due, polling the stop
    /// condition between coarse sleep chunks. Returns true when a stop
    /// condition fired during the wait, or when the schedule will never
    /// run again; the pending iteration is then bypassed entirely. No-op
    /// without a schedule.
    async fn wait_for_schedule(&self, context: &ExecutionContext) -> bool {
        let Some(schedule) = context.schedule() else {
            return false;
        };
        // An exhausted schedule gates forever; running the iteration
        // ungated instead would be a hot spin with a zero pause.
        let Some(next_run) = schedule.upcoming(Utc).next() else {
            debug!(run_id = %self.run_id, "schedule has no upcoming run, stopping");
            return true;
        };

        loop {
            let remaining = next_run.signed_duration_since(Utc::now());
            if remaining <= chrono::Duration::zero() {
                return false;
            }
            if self.check_stop(context) {
                return true;
            }
            let chunk = remaining
                .min(chrono::Duration::seconds(1))
                .to_std()
                .unwrap_or(SCHEDULE_WAIT_CHUNK);
            sleep(chunk).await;
        }
    }

    /// Evaluate the stop condition. First true predicate wins; each is
    /// independent of the others.
    fn check_stop(&self, context: &ExecutionContext) -> bool {
        if context.cancel_requested() {
            debug!(run_id = %self.run_id, "stopping: cancellation requested");
            return true;
        }
        if context
            .iterations_limit()
            .is_some_and(|limit| context.iterations() >= limit)
        {
            debug!(run_id = %self.run_id, "stopping: iterations limit reached");
            return true;
        }
        if context
            .time_limit_seconds()
            .is_some_and(|limit| context.elapsed_seconds() >= limit as f64)
        {
            debug!(run_id = %self.run_id, "stopping: time limit reached");
            return true;
        }
        if context
            .memory_limit_bytes()
            .is_some_and(|limit| self.probe.usage_bytes() >= limit)
        {
            debug!(run_id = %self.run_id, "stopping: memory limit reached");
            return true;
        }
        false
    }

    fn notify(&mut self, context: &ExecutionContext, is_final: bool) {
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = ContextSnapshot::of(context);
        let run_id = &self.run_id;
        self.subscribers.retain(|sender| {
            sender
                .send(IterationEvent {
                    run_id: run_id.clone(),
                    snapshot: snapshot.clone(),
                    is_final,
                })
                .is_ok()
        });
    }

    /// Sleep the configured inter-iteration pause and accrue it. Zero is a
    /// no-op. A negative value here means validation was bypassed, which
    /// is a contract violation.
    async fn pause(&self, context: &mut ExecutionContext) -> Result<(), LoopError> {
        let seconds = context.pause_seconds();
        if seconds < 0 {
            return Err(LoopError::InvalidPauseValue(seconds));
        }
        if seconds == 0 {
            return Ok(());
        }
        sleep(Duration::from_secs(seconds as u64)).await;
        context.add_pause(seconds as u64);
        Ok(())
    }
}

/// Install handlers for the process's termination and interrupt signals
/// that set the cancellation flag. The handlers only set the flag; work in
/// progress is never interrupted.
#[cfg(unix)]
fn install_signal_handlers(cancel: CancelFlag) -> Result<(), LoopError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(LoopError::SignalFacilityUnavailable)?;
    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(LoopError::SignalFacilityUnavailable)?;

    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        cancel.set();
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(cancel: CancelFlag) -> Result<(), LoopError> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.set();
        }
    });
    Ok(())
}
