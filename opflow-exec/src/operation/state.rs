/// Per-run counters, owned by the driving task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationState {
    /// 1-based number of the current attempt since the last successful response.
    pub attempt_count: u32,
    /// 1-based number of the current poll.
    pub poll_count: u32,
}

impl OperationState {
    pub fn new() -> Self {
        Self {
            attempt_count: 1,
            poll_count: 1,
        }
    }
}

impl Default for OperationState {
    fn default() -> Self {
        Self::new()
    }
}
