use std::str::FromStr;

use cron::Schedule;

use crate::error::LoopError;
use crate::memory::MemoryProbe;

/// Sentinel for "no memory limit" in raw option values.
pub const MEMORY_UNLIMITED: i64 = -1;

const BYTES_PER_MEGABYTE: i64 = 1024 * 1024;

/// Raw loop option values, as handed over by whatever parsed the command
/// line. Nothing here is validated yet; `validate` turns a set of raw
/// values into typed [`RunLimits`] or rejects them.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Pause between iterations in seconds (default: 0)
    pub pause: i64,
    /// Memory limit in megabytes (default: -1, unlimited)
    pub memory: i64,
    /// Time limit in seconds (default: none)
    pub time: Option<i64>,
    /// Iterations limit (default: none)
    pub iterations: Option<i64>,
    /// Cron expression gating each iteration (default: none)
    pub schedule: Option<String>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            pause: 0,
            memory: MEMORY_UNLIMITED,
            time: None,
            iterations: None,
            schedule: None,
        }
    }
}

impl LoopOptions {
    /// Validate every raw value and produce the typed limit set.
    ///
    /// Fails fast with a distinct [`LoopError::InvalidConfiguration`] per
    /// option; the memory ceiling comes from the supplied probe so the
    /// check mirrors what the environment will actually allow.
    pub fn validate(&self, probe: &dyn MemoryProbe) -> Result<RunLimits, LoopError> {
        if self.pause < 0 {
            return Err(LoopError::invalid_option(
                "pause",
                "value should be greater than or equal to 0",
            ));
        }

        let memory_limit_bytes = match self.memory {
            MEMORY_UNLIMITED => None,
            mb if mb <= 0 => {
                return Err(LoopError::invalid_option(
                    "memory",
                    "value should be greater than 0 or equal to -1",
                ));
            }
            mb => {
                let bytes = mb as u64 * BYTES_PER_MEGABYTE as u64;
                if let Some(ceiling) = probe.ceiling_bytes() {
                    if bytes > ceiling {
                        return Err(LoopError::invalid_option(
                            "memory",
                            format!(
                                "value should not be greater than the environment limit of {ceiling} bytes"
                            ),
                        ));
                    }
                }
                Some(bytes)
            }
        };

        let time_limit_seconds = match self.time {
            Some(seconds) if seconds <= 0 => {
                return Err(LoopError::invalid_option(
                    "time",
                    "value should be greater than 0",
                ));
            }
            Some(seconds) => Some(seconds as u64),
            None => None,
        };

        let iterations_limit = match self.iterations {
            Some(count) if count <= 0 => {
                return Err(LoopError::invalid_option(
                    "iterations",
                    "value should be greater than 0",
                ));
            }
            Some(count) => Some(count as u64),
            None => None,
        };

        let schedule = match &self.schedule {
            Some(expression) => Some(Schedule::from_str(expression).map_err(|e| {
                LoopError::invalid_option("schedule", format!("not a valid cron expression: {e}"))
            })?),
            None => None,
        };

        Ok(RunLimits {
            pause_seconds: self.pause,
            memory_limit_bytes,
            time_limit_seconds,
            iterations_limit,
            schedule,
        })
    }
}

/// Validated limits for one run, as stored in the execution context.
#[derive(Debug, Clone, Default)]
pub struct RunLimits {
    pub pause_seconds: i64,
    pub memory_limit_bytes: Option<u64>,
    pub time_limit_seconds: Option<u64>,
    pub iterations_limit: Option<u64>,
    pub schedule: Option<Schedule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLimit;

    impl MemoryProbe for NoLimit {
        fn usage_bytes(&self) -> u64 {
            0
        }

        fn ceiling_bytes(&self) -> Option<u64> {
            None
        }
    }

    struct SmallCeiling;

    impl MemoryProbe for SmallCeiling {
        fn usage_bytes(&self) -> u64 {
            0
        }

        fn ceiling_bytes(&self) -> Option<u64> {
            Some(BYTES_PER_MEGABYTE as u64)
        }
    }

    fn failed_option(result: Result<RunLimits, LoopError>) -> &'static str {
        match result {
            Err(LoopError::InvalidConfiguration { option, .. }) => option,
            other => panic!("expected InvalidConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn defaults_validate_to_no_limits() {
        let limits = LoopOptions::default().validate(&NoLimit).unwrap();
        assert_eq!(limits.pause_seconds, 0);
        assert_eq!(limits.memory_limit_bytes, None);
        assert_eq!(limits.time_limit_seconds, None);
        assert_eq!(limits.iterations_limit, None);
        assert!(limits.schedule.is_none());
    }

    #[test]
    fn memory_is_converted_to_bytes() {
        let options = LoopOptions {
            memory: 8,
            ..Default::default()
        };
        let limits = options.validate(&NoLimit).unwrap();
        assert_eq!(limits.memory_limit_bytes, Some(8 * 1024 * 1024));
    }

    #[test]
    fn negative_pause_is_rejected() {
        let options = LoopOptions {
            pause: -1,
            ..Default::default()
        };
        assert_eq!(failed_option(options.validate(&NoLimit)), "pause");
    }

    #[test]
    fn zero_or_below_minus_one_memory_is_rejected() {
        for memory in [0, -2, -100] {
            let options = LoopOptions {
                memory,
                ..Default::default()
            };
            assert_eq!(failed_option(options.validate(&NoLimit)), "memory");
        }
    }

    #[test]
    fn memory_above_environment_ceiling_is_rejected() {
        let options = LoopOptions {
            memory: 2,
            ..Default::default()
        };
        assert_eq!(failed_option(options.validate(&SmallCeiling)), "memory");
    }

    #[test]
    fn memory_at_environment_ceiling_is_accepted() {
        let options = LoopOptions {
            memory: 1,
            ..Default::default()
        };
        assert!(options.validate(&SmallCeiling).is_ok());
    }

    #[test]
    fn non_positive_time_is_rejected() {
        for time in [0, -5] {
            let options = LoopOptions {
                time: Some(time),
                ..Default::default()
            };
            assert_eq!(failed_option(options.validate(&NoLimit)), "time");
        }
    }

    #[test]
    fn non_positive_iterations_are_rejected() {
        for iterations in [0, -3] {
            let options = LoopOptions {
                iterations: Some(iterations),
                ..Default::default()
            };
            assert_eq!(failed_option(options.validate(&NoLimit)), "iterations");
        }
    }

    #[test]
    fn unparseable_schedule_is_rejected() {
        let options = LoopOptions {
            schedule: Some("definitely not cron".to_string()),
            ..Default::default()
        };
        assert_eq!(failed_option(options.validate(&NoLimit)), "schedule");
    }

    #[test]
    fn valid_schedule_parses() {
        let options = LoopOptions {
            schedule: Some("0 0 * * * *".to_string()),
            ..Default::default()
        };
        let limits = options.validate(&NoLimit).unwrap();
        assert!(limits.schedule.is_some());
    }
}
