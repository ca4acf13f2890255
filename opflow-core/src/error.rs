use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retry enabled ({max_retry_attempts} attempts) without a wait strategy: set retry_wait_ms or decay_factor")]
    RetryWithoutWait { max_retry_attempts: i64 },
    #[error("polling enabled ({max_poll_attempts} attempts) without a positive poll_interval_ms")]
    PollWithoutInterval { max_poll_attempts: i64 },
    #[error("polling enabled without a should_poll predicate")]
    PollWithoutPredicate,
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("unknown preset {0:?} (expected \"foreground\" or \"background\")")]
    UnknownPreset(String),
}
