#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opflow_exec::{OperationBuilder, Phase, RequestParts, ResponseParts, Transport, TransportError};
use tokio::sync::{watch, Notify};

pub fn respond(status: u16, body: &str) -> Result<ResponseParts, TransportError> {
    Ok(ResponseParts {
        status,
        headers: BTreeMap::new(),
        body: body.as_bytes().to_vec(),
    })
}

pub fn network_error() -> Result<ResponseParts, TransportError> {
    Err(TransportError::Network("connection refused".to_string()))
}

/// Replays a script of results; the last entry repeats once the script runs out.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ResponseParts, TransportError>>>,
    last: Mutex<Option<Result<ResponseParts, TransportError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RequestParts>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<ResponseParts, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RequestParts> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: RequestParts, _timeout: Duration) -> Result<ResponseParts, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(r) => {
                *self.last.lock().unwrap() = Some(r.clone());
                r
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("scripted transport called with an empty script"),
        }
    }
}

/// Holds every request until `release` is called.
pub struct GateTransport {
    gate: Notify,
    response: Result<ResponseParts, TransportError>,
    calls: AtomicUsize,
}

impl GateTransport {
    pub fn new(response: Result<ResponseParts, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            response,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GateTransport {
    async fn send(&self, _req: RequestParts, _timeout: Duration) -> Result<ResponseParts, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.response.clone()
    }
}

/// Collects callback invocations as short strings.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Attaches a recording closure to every callback.
    pub fn wire(&self, builder: OperationBuilder) -> OperationBuilder {
        let (a, b, c, d, e, f, g) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        builder
            .on_pre_load(move || a.push("pre_load"))
            .on_post_load(move || b.push("post_load"))
            .on_success(move |body, status| c.push(format!("success:{status}:{body}")))
            .on_failure(move |body, status| d.push(format!("failure:{status}:{body}")))
            .on_fatal(move |info| e.push(format!("fatal:{:?}:{}", info.code, info.message)))
            .on_abort(move || f.push("abort"))
            .on_after_load(move || g.push("after_load"))
    }
}

pub async fn wait_terminal(mut rx: watch::Receiver<Phase>) -> Phase {
    rx.wait_for(|p| p.is_terminal()).await.unwrap().clone()
}

pub async fn wait_in_flight(mut rx: watch::Receiver<Phase>) {
    rx.wait_for(|p| matches!(p, Phase::InFlight { .. })).await.unwrap();
}
