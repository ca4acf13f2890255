use std::sync::{Arc, PoisonError};

use opflow_core::StatusClass;
use tokio::sync::mpsc;

use crate::callbacks::{Callbacks, ErrorInfo, Terminal};
use crate::phase::Phase;
use crate::response::parse_body;
use crate::transport::{RequestParts, ResponseParts};
use crate::upload::UploadInner;

pub(crate) async fn drive(inner: Arc<UploadInner>, mut callbacks: Callbacks) {
    let phase = run(&inner, &mut callbacks).await;
    *inner
        .callbacks
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(callbacks);
    inner.control.finish(phase);
}

async fn run(inner: &UploadInner, callbacks: &mut Callbacks) -> Phase {
    let control = &inner.control;
    let descriptor = &inner.descriptor;

    if !control.wait(Phase::Scheduled, descriptor.policy.start_delay()).await {
        return Phase::Aborted;
    }

    let endpoint = descriptor.endpoint.resolve();
    control.set_phase(Phase::InFlight { attempt: 1, poll: 1 });
    tracing::debug!(endpoint = %endpoint, method = %descriptor.method, "starting upload");

    callbacks.pre_load();

    let outcome = match transfer(inner, callbacks, &endpoint).await {
        Some(outcome) => outcome,
        None => {
            tracing::debug!(endpoint = %endpoint, "upload aborted in flight");
            callbacks.settle_aborted(control);
            return Phase::Aborted;
        }
    };

    callbacks.settle(control, &endpoint, classify(outcome))
}

/// Runs the transfer, forwarding progress ticks. `None` means the upload was
/// closed and the transport future dropped.
async fn transfer(
    inner: &UploadInner,
    callbacks: &mut Callbacks,
    endpoint: &str,
) -> Option<Result<ResponseParts, ErrorInfo>> {
    let descriptor = &inner.descriptor;
    let control = &inner.control;

    let url = match url::Url::parse(endpoint) {
        Ok(url) => url,
        Err(_) => {
            return Some(Err(ErrorInfo::new(
                format!("invalid endpoint URL: {endpoint}"),
                None,
            )))
        }
    };

    let body = tokio::select! {
        biased;
        _ = control.cancelled() => return None,
        body = descriptor.payload.load() => body,
    };
    let body = match body {
        Ok(body) => body,
        Err(info) => return Some(Err(info)),
    };

    let req = RequestParts {
        method: descriptor.method.clone(),
        url,
        headers: descriptor.headers.resolve(),
        body,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let send = inner.transport.upload(req, descriptor.policy.timeout(), tx);
    tokio::pin!(send);

    let result = loop {
        tokio::select! {
            biased;
            _ = control.cancelled() => return None,
            Some(event) = rx.recv() => callbacks.progress(&event),
            result = &mut send => break result,
        }
    };

    while let Ok(event) = rx.try_recv() {
        callbacks.progress(&event);
    }

    Some(result.map_err(|e| ErrorInfo::new(e.to_string(), None)))
}

fn classify(outcome: Result<ResponseParts, ErrorInfo>) -> Terminal {
    let resp = match outcome {
        Ok(resp) => resp,
        Err(info) => return Terminal::Fatal(info),
    };
    let status = resp.status;
    match parse_body(&resp) {
        Ok(body) if StatusClass::of(status) == StatusClass::Success => Terminal::Success { body, status },
        Ok(body) => Terminal::Failure { body, status },
        Err(message) => Terminal::Fatal(ErrorInfo::new(message, None)),
    }
}
