//! Reusable control loop for long-running daemon processes
//!
//! This crate provides a loop controller that repeatedly invokes a
//! caller-supplied unit of work under bounded resource and time
//! constraints, with cooperative cancellation (SIGTERM/SIGINT or an
//! explicit [`CancelFlag`]) and optional cron-style scheduling between
//! iterations.
//!
//! ```no_run
//! use daemon_loop::{LoopController, LoopOptions};
//!
//! # async fn demo() -> Result<(), daemon_loop::LoopError> {
//! let options = LoopOptions {
//!     pause: 5,
//!     iterations: Some(100),
//!     ..Default::default()
//! };
//!
//! let summary = LoopController::new(options)
//!     .run(|_ctx| async {
//!         // one unit of work
//!         Ok(())
//!     })
//!     .await?;
//!
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod context;
mod controller;
mod error;
mod event;
mod limits;
mod memory;
mod summary;

pub use context::{CancelFlag, ExecutionContext};
pub use controller::LoopController;
pub use error::{IterationError, LoopError};
pub use event::{ContextSnapshot, EventReceiver, EventSender, IterationEvent, channel};
pub use limits::{LoopOptions, MEMORY_UNLIMITED, RunLimits};
pub use memory::{MemoryProbe, ProcMemory};
pub use summary::RunSummary;
