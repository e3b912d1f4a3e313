use std::time::Duration;

/// Fixed-delay retry policy for fetches.
///
/// `max_attempts` counts every attempt, including the first. Zero means the
/// fetch is never attempted and reports exhaustion straight away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Consecutive challenge failures on one session before it is discarded.
    pub challenge_strikes: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
            challenge_strikes: 2,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay to wait after `attempts_made` failures, or `None` once the
    /// ceiling is reached.
    pub fn delay_after(&self, attempts_made: u32) -> Option<Duration> {
        self.allows_attempt(attempts_made).then_some(self.delay)
    }

    pub fn session_compromised(&self, consecutive_challenges: u32) -> bool {
        self.challenge_strikes > 0 && consecutive_challenges >= self.challenge_strikes
    }
}
