use std::fmt;

/// Immutable report of a completed run, returned by `LoopController::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Wall-clock duration of the run in seconds, millisecond precision
    pub elapsed_seconds: f64,
    /// Seconds spent in inter-iteration pauses
    pub total_pause_seconds: u64,
    /// Process memory usage sampled at the end of the run, in bytes
    pub memory_bytes: u64,
    /// Completed iterations
    pub iterations: u64,
}

impl RunSummary {
    /// Memory usage in megabytes, rounded to three decimals.
    pub fn memory_megabytes(&self) -> f64 {
        let mb = self.memory_bytes as f64 / 1024.0 / 1024.0;
        (mb * 1000.0).round() / 1000.0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total execution time: {}s", self.elapsed_seconds)?;
        if self.total_pause_seconds > 0 {
            writeln!(f, "Total pause time: {}s", self.total_pause_seconds)?;
        }
        writeln!(f, "Memory usage: {}MB", self.memory_megabytes())?;
        write!(f, "Iterations count: {}", self.iterations)
    }
}
