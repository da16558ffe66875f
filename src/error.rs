use std::error::Error;
use std::fmt;

/// Source error type produced by the caller-supplied iteration operation.
pub type IterationError = Box<dyn Error + Send + Sync>;

/// Reason why a controller run failed
///
/// This is returned as `Err(LoopError)` from `LoopController::run()`.
/// Reaching a configured limit or being cancelled is not an error; those
/// are the designed termination paths and yield `Ok(RunSummary)`.
#[derive(Debug)]
pub enum LoopError {
    // === Startup errors (before any iteration runs) ===
    /// A raw option value failed validation, or the schedule expression
    /// did not parse. `option` names the offending option.
    InvalidConfiguration {
        option: &'static str,
        reason: String,
    },

    /// Signal handlers were requested but could not be installed. Fatal:
    /// the loop must not silently run uncancellable.
    SignalFacilityUnavailable(std::io::Error),

    // === Run errors ===
    /// The caller-supplied iteration operation returned an error. Never
    /// caught or retried; the run terminates immediately and the
    /// after-cycle hook and summary are skipped.
    IterationFailure(IterationError),

    /// A negative pause value reached the pause step. Validation rejects
    /// these up front, so this indicates a logic defect, not user input.
    InvalidPauseValue(i64),
}

impl LoopError {
    pub(crate) fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            option,
            reason: reason.into(),
        }
    }

    /// Returns true if this was detected at startup, before any iteration.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. } | Self::SignalFacilityUnavailable(_)
        )
    }

    /// Returns true if this is a rejected option value.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration { .. })
    }

    /// Returns true if the caller-supplied operation failed.
    pub fn is_iteration_failure(&self) -> bool {
        matches!(self, Self::IterationFailure(_))
    }

    /// Name of the rejected option, for configuration errors.
    pub fn option(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration { option, .. } => Some(option),
            _ => None,
        }
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { option, reason } => {
                write!(f, "invalid '{option}' option: {reason}")
            }
            Self::SignalFacilityUnavailable(e) => {
                write!(f, "termination signal handlers could not be installed: {e}")
            }
            Self::IterationFailure(e) => write!(f, "iteration failed: {e}"),
            Self::InvalidPauseValue(seconds) => {
                write!(f, "pause of {seconds}s reached the pause step; value should be greater than or equal to 0")
            }
        }
    }
}

impl Error for LoopError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SignalFacilityUnavailable(e) => Some(e),
            Self::IterationFailure(e) => Some(e.as_ref()),
            Self::InvalidConfiguration { .. } | Self::InvalidPauseValue(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let err = LoopError::invalid_option("pause", "value should be greater than or equal to 0");
        assert!(err.is_startup_error());
        assert!(err.is_configuration());
        assert!(!err.is_iteration_failure());
        assert_eq!(err.option(), Some("pause"));

        let err = LoopError::IterationFailure("boom".into());
        assert!(err.is_iteration_failure());
        assert!(!err.is_startup_error());
        assert_eq!(err.option(), None);
    }

    #[test]
    fn display_names_the_option() {
        let err = LoopError::invalid_option("memory", "value should be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid 'memory' option: value should be greater than 0"
        );
    }

    #[test]
    fn iteration_failure_exposes_source() {
        let err = LoopError::IterationFailure("boom".into());
        assert!(err.source().is_some());
    }
}
