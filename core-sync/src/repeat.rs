use core_async::time::Duration;

/// How a command group is retried after a recoverable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatRule {
    /// One attempt, the error is returned as is.
    Single,
    /// Keep retrying recoverable failures, pausing between attempts, until
    /// the command succeeds, a fatal error occurs or the token is cancelled.
    WithInterval(Duration),
}

impl RepeatRule {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            RepeatRule::Single => None,
            RepeatRule::WithInterval(interval) => Some(*interval),
        }
    }
}
