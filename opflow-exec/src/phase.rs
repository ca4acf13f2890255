use std::time::Duration;

/// Published lifecycle position of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Waiting out the start delay.
    Scheduled,
    InFlight { attempt: u32, poll: u32 },
    /// Waiting out a backoff before `attempt`.
    Retrying { attempt: u32, delay: Duration },
    /// Waiting out the poll interval before poll number `poll`.
    Polling { poll: u32, delay: Duration },
    Succeeded,
    Failed,
    Fatal,
    Aborted,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Succeeded | Phase::Failed | Phase::Fatal | Phase::Aborted
        )
    }

    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != Phase::Idle
    }
}
