use std::time::Duration;

use crate::policy::OperationPolicy;

/// Wait strategy applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    Fixed { wait_ms: i64 },
    /// `decay_factor * (2^n - 1) * 1000`, capped by `max_wait_ms` when positive.
    Exponential { decay_factor: f64, max_wait_ms: i64 },
}

impl BackoffStrategy {
    /// Picks the strategy configured on `policy`, or `None` if there is none.
    pub fn from_policy(policy: &OperationPolicy) -> Option<Self> {
        if policy.decay_factor > 0.0 {
            Some(BackoffStrategy::Exponential {
                decay_factor: policy.decay_factor,
                max_wait_ms: policy.max_retry_wait_ms,
            })
        } else if policy.retry_wait_ms > 0 {
            Some(BackoffStrategy::Fixed {
                wait_ms: policy.retry_wait_ms,
            })
        } else {
            None
        }
    }

    /// Wait before retrying after attempt `attempt` (1-based).
    ///
    /// Returns `None` when the computed wait is negative or not finite; the
    /// caller must stop instead of retrying.
    pub fn wait(&self, attempt: u32) -> Option<Duration> {
        let ms = match *self {
            BackoffStrategy::Fixed { wait_ms } => wait_ms as f64,
            BackoffStrategy::Exponential {
                decay_factor,
                max_wait_ms,
            } => {
                let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
                let raw = decay_factor * (2f64.powi(exp) - 1.0) * 1000.0;
                if max_wait_ms > 0 && raw > max_wait_ms as f64 {
                    max_wait_ms as f64
                } else {
                    raw
                }
            }
        };
        to_duration(ms)
    }
}

fn to_duration(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some(Duration::from_millis(ms.round() as u64))
}
