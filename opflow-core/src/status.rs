/// 204: a body that fails to parse is not an error for this status.
pub const NO_CONTENT: u16 = 204;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx
    Success,
    /// 5xx, transient and retryable.
    ServerError,
    /// Everything else (1xx, 3xx, 4xx, nonsense codes). Never retried.
    Other,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}
