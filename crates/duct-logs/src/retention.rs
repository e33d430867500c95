//! Post-run retention of logs for quickly failing commands

/// Decides whether a finished run's logs are kept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    /// Seconds; failures faster than this are discarded. Negative discards
    /// every failure, zero keeps everything.
    pub fail_time: f64,
}

impl RetentionPolicy {
    pub fn new(fail_time: f64) -> Self {
        Self { fail_time }
    }

    pub fn should_remove(&self, exit_code: i32, wall_clock_time: f64) -> bool {
        if exit_code == 0 || self.fail_time == 0.0 {
            return false;
        }
        self.fail_time < 0.0 || wall_clock_time < self.fail_time
    }
}
