use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use opflow_core::{ConfigError, UploadPolicy};
use serde_json::Value as JsonValue;

use crate::callbacks::{Callbacks, ErrorInfo};
use crate::control::Control;
use crate::source::Source;
use crate::transport::{default_upload_transport, ProgressEvent, UploadTransport};
use crate::upload::{Payload, UploadDescriptor, UploadInner, UploadOperation};

pub struct UploadBuilder {
    endpoint: Source<String>,
    method: String,
    headers: BTreeMap<String, String>,
    headers_fn: Option<Source<BTreeMap<String, String>>>,
    payload: Payload,
    policy: UploadPolicy,
    callbacks: Callbacks,
    transport: Option<Arc<dyn UploadTransport>>,
}

impl UploadBuilder {
    pub fn new(endpoint: Source<String>) -> Self {
        Self {
            endpoint,
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            headers_fn: None,
            payload: Payload::Bytes(Source::Fixed(Vec::new())),
            policy: UploadPolicy::default(),
            callbacks: Callbacks::default(),
            transport: None,
        }
    }

    pub fn endpoint_fn(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.endpoint = Source::producer(f);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.header("Content-Type", content_type)
    }

    /// Produces headers when the transfer starts. Overrides `header`/`content_type`.
    pub fn headers_fn(mut self, f: impl Fn() -> BTreeMap<String, String> + Send + Sync + 'static) -> Self {
        self.headers_fn = Some(Source::producer(f));
        self
    }

    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.payload = Payload::Bytes(Source::Fixed(bytes.into()));
        self
    }

    pub fn bytes_fn(mut self, f: impl Fn() -> Vec<u8> + Send + Sync + 'static) -> Self {
        self.payload = Payload::Bytes(Source::producer(f));
        self
    }

    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload = Payload::File(path.into());
        self
    }

    pub fn policy(mut self, policy: UploadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn start_delay_ms(mut self, ms: i64) -> Self {
        self.policy.start_delay_ms = ms;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.policy.timeout_ms = ms;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn UploadTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Fired with `floor(loaded * 100 / total)` for every tick of a transfer
    /// whose total size is known.
    pub fn on_progress(mut self, f: impl FnMut(u8, &ProgressEvent) + Send + 'static) -> Self {
        self.callbacks.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnMut(JsonValue, u16) + Send + 'static) -> Self {
        self.callbacks.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnMut(JsonValue, u16) + Send + 'static) -> Self {
        self.callbacks.on_failure = Some(Box::new(f));
        self
    }

    pub fn on_fatal(mut self, f: impl FnMut(ErrorInfo) + Send + 'static) -> Self {
        self.callbacks.on_fatal = Some(Box::new(f));
        self
    }

    pub fn on_abort(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_abort = Some(Box::new(f));
        self
    }

    pub fn on_pre_load(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_pre_load = Some(Box::new(f));
        self
    }

    pub fn on_post_load(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_post_load = Some(Box::new(f));
        self
    }

    pub fn on_after_load(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_after_load = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<UploadOperation, ConfigError> {
        if let Source::Fixed(endpoint) = &self.endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        }

        let headers = self.headers_fn.unwrap_or(Source::Fixed(self.headers));
        Ok(UploadOperation::from_inner(UploadInner {
            descriptor: UploadDescriptor {
                endpoint: self.endpoint,
                method: self.method,
                headers,
                payload: self.payload,
                policy: self.policy,
            },
            transport: self.transport.unwrap_or_else(default_upload_transport),
            callbacks: Mutex::new(Some(self.callbacks)),
            control: Control::new(),
        }))
    }
}
