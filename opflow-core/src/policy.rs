use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffStrategy;
use crate::error::ConfigError;

/// Retry, poll and scheduling knobs for one request operation.
///
/// Integer fields keep the "zero or negative disables" convention, so a
/// policy deserialized from a manifest can switch a feature off with `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationPolicy {
    /// Fixed wait between retries.
    pub retry_wait_ms: i64,
    /// Exponential backoff seed; takes precedence over `retry_wait_ms`.
    pub decay_factor: f64,
    /// Cap for exponential waits, ignored when `<= 0`.
    pub max_retry_wait_ms: i64,
    pub max_retry_attempts: i64,
    pub poll_interval_ms: i64,
    pub max_poll_attempts: i64,
    pub start_delay_ms: i64,
    pub timeout_ms: u64,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            retry_wait_ms: 0,
            decay_factor: 0.0,
            max_retry_wait_ms: 0,
            max_retry_attempts: 0,
            poll_interval_ms: 0,
            max_poll_attempts: 0,
            start_delay_ms: 0,
            timeout_ms: 30_000,
        }
    }
}

impl OperationPolicy {
    /// User-facing requests: start almost immediately, retry a few times on a short fixed wait.
    pub fn foreground() -> Self {
        Self {
            start_delay_ms: 10,
            retry_wait_ms: 1_000,
            max_retry_attempts: 3,
            ..Self::default()
        }
    }

    /// Deferred housekeeping requests: start late, no retry unless asked for.
    pub fn background() -> Self {
        Self {
            start_delay_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn retry_enabled(&self) -> bool {
        self.max_retry_attempts > 0
    }

    pub fn polling_enabled(&self) -> bool {
        self.max_poll_attempts > 0
    }

    /// True when both wait strategies are configured; `decay_factor` wins.
    pub fn has_conflicting_waits(&self) -> bool {
        self.retry_wait_ms > 0 && self.decay_factor > 0.0
    }

    pub fn backoff(&self) -> Option<BackoffStrategy> {
        BackoffStrategy::from_policy(self)
    }

    pub fn start_delay(&self) -> Duration {
        non_negative_ms(self.start_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        non_negative_ms(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks the retry and poll invariants.
    ///
    /// `has_should_poll` reports whether the caller attached a poll predicate;
    /// the predicate is a closure and so is not part of this struct.
    pub fn validate(&self, has_should_poll: bool) -> Result<(), ConfigError> {
        if self.retry_enabled() && self.backoff().is_none() {
            return Err(ConfigError::RetryWithoutWait {
                max_retry_attempts: self.max_retry_attempts,
            });
        }
        if self.polling_enabled() {
            if self.poll_interval_ms <= 0 {
                return Err(ConfigError::PollWithoutInterval {
                    max_poll_attempts: self.max_poll_attempts,
                });
            }
            if !has_should_poll {
                return Err(ConfigError::PollWithoutPredicate);
            }
        }
        Ok(())
    }
}

/// Scheduling knobs for an upload. Uploads never retry or poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadPolicy {
    pub start_delay_ms: i64,
    pub timeout_ms: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            start_delay_ms: 0,
            timeout_ms: 300_000,
        }
    }
}

impl UploadPolicy {
    pub fn start_delay(&self) -> Duration {
        non_negative_ms(self.start_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Named starting points for [`OperationPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Foreground,
    Background,
}

impl Preset {
    pub fn policy(self) -> OperationPolicy {
        match self {
            Preset::Foreground => OperationPolicy::foreground(),
            Preset::Background => OperationPolicy::background(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Foreground => "foreground",
            Preset::Background => "background",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "foreground" => Ok(Preset::Foreground),
            "background" => Ok(Preset::Background),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}

fn non_negative_ms(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
