//! Caller-supplied lifecycle callbacks and the order they fire in.
//!
//! Every attempt fires `pre_load` before the transport call and `post_load`
//! after it. An aborted operation then fires `abort` and nothing else.
//! Otherwise exactly one of `success`/`failure`/`fatal` fires for the
//! operation, followed by `after_load` unless that callback aborted it.

use serde_json::Value as JsonValue;

use crate::control::Control;
use crate::phase::Phase;
use crate::transport::ProgressEvent;

pub type BodyCallback = Box<dyn FnMut(JsonValue, u16) + Send>;
pub type FatalCallback = Box<dyn FnMut(ErrorInfo) + Send>;
pub type HookCallback = Box<dyn FnMut() + Send>;
pub type ProgressCallback = Box<dyn FnMut(u8, &ProgressEvent) + Send>;

/// Payload of the `fatal` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    /// HTTP status when one was received; `None` for transport and parse errors.
    pub code: Option<u16>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) on_success: Option<BodyCallback>,
    pub(crate) on_failure: Option<BodyCallback>,
    pub(crate) on_fatal: Option<FatalCallback>,
    pub(crate) on_abort: Option<HookCallback>,
    pub(crate) on_pre_load: Option<HookCallback>,
    pub(crate) on_post_load: Option<HookCallback>,
    pub(crate) on_after_load: Option<HookCallback>,
    pub(crate) on_progress: Option<ProgressCallback>,
}

/// How an operation ended, short of being aborted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    Success { body: JsonValue, status: u16 },
    Failure { body: JsonValue, status: u16 },
    Fatal(ErrorInfo),
}

impl Terminal {
    fn phase(&self) -> Phase {
        match self {
            Terminal::Success { .. } => Phase::Succeeded,
            Terminal::Failure { .. } => Phase::Failed,
            Terminal::Fatal(_) => Phase::Fatal,
        }
    }
}

impl Callbacks {
    pub(crate) fn pre_load(&mut self) {
        fire(&mut self.on_pre_load);
    }

    pub(crate) fn post_load(&mut self) {
        fire(&mut self.on_post_load);
    }

    pub(crate) fn progress(&mut self, event: &ProgressEvent) {
        let (Some(cb), Some(percent)) = (self.on_progress.as_mut(), event.percent()) else {
            return;
        };
        cb(percent, event);
    }

    /// Fires `post_load` and then either `abort` or the terminal sequence.
    pub(crate) fn settle(&mut self, control: &Control, endpoint: &str, terminal: Terminal) -> Phase {
        if self.settle_aborted(control) {
            return Phase::Aborted;
        }
        self.finish(control, endpoint, terminal)
    }

    /// Fires `post_load`, then `abort` if the operation was stopped meanwhile.
    /// Returns true when the attempt ended as an abort.
    pub(crate) fn settle_aborted(&mut self, control: &Control) -> bool {
        self.post_load();
        if control.is_aborted() {
            fire(&mut self.on_abort);
            return true;
        }
        false
    }

    /// Fires the terminal callback and, unless it stopped the operation, `after_load`.
    pub(crate) fn finish(&mut self, control: &Control, endpoint: &str, terminal: Terminal) -> Phase {
        let phase = terminal.phase();
        match terminal {
            Terminal::Success { body, status } => match self.on_success.as_mut() {
                Some(cb) => cb(body, status),
                None => tracing::warn!(endpoint, status, "operation succeeded but no success callback is registered"),
            },
            Terminal::Failure { body, status } => match self.on_failure.as_mut() {
                Some(cb) => cb(body, status),
                None => tracing::warn!(endpoint, status, "operation failed but no failure callback is registered"),
            },
            Terminal::Fatal(info) => match self.on_fatal.as_mut() {
                Some(cb) => cb(info),
                None => tracing::warn!(endpoint, error = %info.message, "operation hit a fatal error but no fatal callback is registered"),
            },
        }
        if !control.is_aborted() {
            fire(&mut self.on_after_load);
        }
        phase
    }
}

fn fire(hook: &mut Option<HookCallback>) {
    if let Some(cb) = hook.as_mut() {
        cb();
    }
}
