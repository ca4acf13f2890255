use std::sync::{Arc, PoisonError};
use std::time::Duration;

use opflow_core::StatusClass;

use crate::callbacks::{Callbacks, ErrorInfo, Terminal};
use crate::operation::{Inner, OperationState};
use crate::phase::Phase;
use crate::response::parse_body;
use crate::transport::{RequestParts, ResponseParts, TransportError};

/// What the driver does after one attempt.
enum Next {
    Retry(Duration),
    Poll(Duration),
    Done(Phase),
}

/// What one attempt's outcome means before callbacks run.
enum Verdict {
    Retry(Duration),
    Poll(Duration),
    Terminal(Terminal),
}

pub(crate) async fn drive(inner: Arc<Inner>, mut callbacks: Callbacks) {
    let phase = run(&inner, &mut callbacks).await;
    *inner
        .callbacks
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(callbacks);
    inner.control.finish(phase);
}

async fn run(inner: &Inner, callbacks: &mut Callbacks) -> Phase {
    let control = &inner.control;
    let policy = &inner.descriptor.policy;
    let mut state = OperationState::new();

    if !control.wait(Phase::Scheduled, policy.start_delay()).await {
        return Phase::Aborted;
    }

    loop {
        match attempt(inner, callbacks, &mut state).await {
            Next::Done(phase) => return phase,
            Next::Retry(delay) => {
                let phase = Phase::Retrying {
                    attempt: state.attempt_count,
                    delay,
                };
                if !control.wait(phase, delay).await {
                    return Phase::Aborted;
                }
            }
            Next::Poll(delay) => {
                let phase = Phase::Polling {
                    poll: state.poll_count,
                    delay,
                };
                if !control.wait(phase, delay).await {
                    return Phase::Aborted;
                }
            }
        }
    }
}

async fn attempt(inner: &Inner, callbacks: &mut Callbacks, state: &mut OperationState) -> Next {
    let descriptor = &inner.descriptor;
    let control = &inner.control;

    let endpoint = descriptor.endpoint.resolve();
    let params = descriptor.params.resolve();

    control.set_phase(Phase::InFlight {
        attempt: state.attempt_count,
        poll: state.poll_count,
    });
    tracing::debug!(
        endpoint = %endpoint,
        method = %params.method,
        attempt = state.attempt_count,
        poll = state.poll_count,
        "starting attempt"
    );

    callbacks.pre_load();

    let sent = match url::Url::parse(&endpoint) {
        Ok(url) => {
            let req = RequestParts {
                method: params.method,
                url,
                headers: params.headers,
                body: params.body,
            };
            Some(inner.transport.send(req, descriptor.policy.timeout()).await)
        }
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "endpoint is not a valid URL");
            None
        }
    };

    if callbacks.settle_aborted(control) {
        return Next::Done(Phase::Aborted);
    }

    let verdict = match sent {
        Some(Ok(resp)) => classify_response(inner, state, &endpoint, resp),
        Some(Err(err)) => on_transport_error(inner, state, &endpoint, err),
        None => Verdict::Terminal(Terminal::Fatal(ErrorInfo::new(
            format!("invalid endpoint URL: {endpoint}"),
            None,
        ))),
    };

    match verdict {
        Verdict::Retry(delay) => Next::Retry(delay),
        Verdict::Poll(delay) => Next::Poll(delay),
        Verdict::Terminal(terminal) => Next::Done(callbacks.finish(control, &endpoint, terminal)),
    }
}

fn on_transport_error(inner: &Inner, state: &mut OperationState, endpoint: &str, err: TransportError) -> Verdict {
    tracing::debug!(endpoint, attempt = state.attempt_count, error = %err, "transport failure");
    retry_or_fatal(inner, state, endpoint, ErrorInfo::new(err.to_string(), None))
}

fn classify_response(inner: &Inner, state: &mut OperationState, endpoint: &str, resp: ResponseParts) -> Verdict {
    let status = resp.status;

    if StatusClass::of(status) == StatusClass::ServerError {
        tracing::debug!(endpoint, attempt = state.attempt_count, status, "server error");
        let info = ErrorInfo::new(format!("server responded with status {status}"), Some(status));
        return retry_or_fatal(inner, state, endpoint, info);
    }

    let body = match parse_body(&resp) {
        Ok(body) => body,
        Err(message) => return Verdict::Terminal(Terminal::Fatal(ErrorInfo::new(message, None))),
    };

    if StatusClass::of(status) != StatusClass::Success {
        return Verdict::Terminal(Terminal::Failure { body, status });
    }

    state.attempt_count = 1;

    let policy = &inner.descriptor.policy;
    let wants_poll = match (&inner.descriptor.should_poll, policy.polling_enabled()) {
        (Some(should_poll), true) => should_poll(&body, status),
        _ => false,
    };
    if wants_poll {
        state.poll_count += 1;
        if i64::from(state.poll_count) <= policy.max_poll_attempts {
            tracing::debug!(endpoint, poll = state.poll_count, "poll scheduled");
            return Verdict::Poll(policy.poll_interval());
        }
        tracing::debug!(endpoint, max_poll_attempts = policy.max_poll_attempts, "poll attempts exhausted");
    }

    Verdict::Terminal(Terminal::Success { body, status })
}

fn retry_or_fatal(inner: &Inner, state: &mut OperationState, endpoint: &str, error: ErrorInfo) -> Verdict {
    let policy = &inner.descriptor.policy;
    if !policy.retry_enabled() || i64::from(state.attempt_count) > policy.max_retry_attempts {
        return Verdict::Terminal(Terminal::Fatal(error));
    }

    match policy.backoff().and_then(|b| b.wait(state.attempt_count)) {
        Some(delay) => {
            state.attempt_count += 1;
            tracing::debug!(endpoint, next_attempt = state.attempt_count, ?delay, "retry scheduled");
            Verdict::Retry(delay)
        }
        None => {
            tracing::warn!(endpoint, attempt = state.attempt_count, "retry wait is invalid; giving up");
            Verdict::Terminal(Terminal::Fatal(error))
        }
    }
}
