use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::context::ExecutionContext;

/// Plain data view of the run state at the moment an iteration finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Iterations completed so far, including the one just finished
    pub iterations: u64,
    /// Wall-clock seconds since the run started
    pub elapsed_seconds: f64,
    /// Seconds spent in inter-iteration pauses
    pub total_pause_seconds: u64,
    /// Configured pause between iterations, in seconds
    pub pause_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations_limit: Option<u64>,
}

impl ContextSnapshot {
    pub fn of(context: &ExecutionContext) -> Self {
        Self {
            iterations: context.iterations(),
            elapsed_seconds: context.elapsed_seconds(),
            total_pause_seconds: context.total_pause_seconds(),
            pause_seconds: context.pause_seconds(),
            memory_limit_bytes: context.memory_limit_bytes(),
            time_limit_seconds: context.time_limit_seconds(),
            iterations_limit: context.iterations_limit(),
        }
    }
}

/// Notification delivered to subscribers after each completed iteration.
///
/// `is_final` distinguishes "iteration N of an ongoing run" from "the run
/// is ending": it is true exactly once, on the event for the last
/// iteration before the loop exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationEvent {
    /// Identity of the run this event belongs to
    pub run_id: String,
    pub snapshot: ContextSnapshot,
    pub is_final: bool,
}

/// Sender half registered with the controller via `subscribe`.
pub type EventSender = mpsc::UnboundedSender<IterationEvent>;

/// Receiver half kept by the subscriber.
pub type EventReceiver = mpsc::UnboundedReceiver<IterationEvent>;

/// Create a subscription channel pair.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelFlag;
    use crate::limits::RunLimits;

    #[tokio::test]
    async fn snapshot_mirrors_the_context() {
        let limits = RunLimits {
            pause_seconds: 2,
            iterations_limit: Some(5),
            ..Default::default()
        };
        let mut context = ExecutionContext::new(limits, CancelFlag::new());
        context.increment_iterations();
        context.add_pause(2);

        let snapshot = ContextSnapshot::of(&context);
        assert_eq!(snapshot.iterations, 1);
        assert_eq!(snapshot.total_pause_seconds, 2);
        assert_eq!(snapshot.pause_seconds, 2);
        assert_eq!(snapshot.iterations_limit, Some(5));
        assert_eq!(snapshot.memory_limit_bytes, None);
    }

    #[tokio::test]
    async fn absent_limits_are_omitted_from_json() {
        let context = ExecutionContext::new(RunLimits::default(), CancelFlag::new());
        let event = IterationEvent {
            run_id: "run".to_string(),
            snapshot: ContextSnapshot::of(&context),
            is_final: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["snapshot"].get("iterations_limit").is_none());
        assert_eq!(json["run_id"], "run");
    }
}
