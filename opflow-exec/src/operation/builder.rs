use std::sync::{Arc, Mutex};

use opflow_core::{ConfigError, OperationPolicy};
use serde_json::Value as JsonValue;

use crate::callbacks::{Callbacks, ErrorInfo};
use crate::control::Control;
use crate::operation::{Descriptor, Inner, Operation, PollPredicate, RequestParams};
use crate::source::Source;
use crate::transport::{default_transport, Transport};

/// Fluent construction of an [`Operation`].
///
/// Start from [`Operation::builder`] (no retry, no delay) or one of the
/// presets, then override what you need.
pub struct OperationBuilder {
    endpoint: Source<String>,
    params: RequestParams,
    params_fn: Option<Source<RequestParams>>,
    policy: OperationPolicy,
    should_poll: Option<PollPredicate>,
    callbacks: Callbacks,
    transport: Option<Arc<dyn Transport>>,
}

impl OperationBuilder {
    pub fn new(endpoint: Source<String>, policy: OperationPolicy) -> Self {
        Self {
            endpoint,
            params: RequestParams::default(),
            params_fn: None,
            policy,
            should_poll: None,
            callbacks: Callbacks::default(),
            transport: None,
        }
    }

    /// Replaces the endpoint with a producer evaluated before every attempt.
    pub fn endpoint_fn(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.endpoint = Source::producer(f);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.params.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.params.body = body.into();
        self
    }

    /// Serialises `value` as the body and sets `Content-Type: application/json`.
    pub fn json(mut self, value: &JsonValue) -> Self {
        self.params.body = value.to_string().into_bytes();
        self.params
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    /// Produces method, headers and body fresh for every attempt. Overrides
    /// `method`, `header`, `body` and `json`.
    pub fn params_fn(mut self, f: impl Fn() -> RequestParams + Send + Sync + 'static) -> Self {
        self.params_fn = Some(Source::producer(f));
        self
    }

    pub fn policy(mut self, policy: OperationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_wait_ms(mut self, ms: i64) -> Self {
        self.policy.retry_wait_ms = ms;
        self
    }

    pub fn decay_factor(mut self, factor: f64) -> Self {
        self.policy.decay_factor = factor;
        self
    }

    pub fn max_retry_wait_ms(mut self, ms: i64) -> Self {
        self.policy.max_retry_wait_ms = ms;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: i64) -> Self {
        self.policy.max_retry_attempts = attempts;
        self
    }

    pub fn poll_interval_ms(mut self, ms: i64) -> Self {
        self.policy.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, attempts: i64) -> Self {
        self.policy.max_poll_attempts = attempts;
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

    /// Keep polling while this returns true for a successful response.
    pub fn should_poll(mut self, f: impl Fn(&JsonValue, u16) -> bool + Send + Sync + 'static) -> Self {
        self.should_poll = Some(Arc::new(f));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
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

    pub fn build(self) -> Result<Operation, ConfigError> {
        self.policy.validate(self.should_poll.is_some())?;

        if let Source::Fixed(endpoint) = &self.endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.policy.has_conflicting_waits() {
            tracing::warn!(
                endpoint = ?self.endpoint,
                retry_wait_ms = self.policy.retry_wait_ms,
                decay_factor = self.policy.decay_factor,
                "both retry_wait_ms and decay_factor are set; exponential backoff takes precedence"
            );
        }
        if self.should_poll.is_some() && !self.policy.polling_enabled() {
            tracing::debug!(endpoint = ?self.endpoint, "should_poll is set but max_poll_attempts disables polling");
        }

        let params = self.params_fn.unwrap_or(Source::Fixed(self.params));
        Ok(Operation::from_inner(Inner {
            descriptor: Descriptor {
                endpoint: self.endpoint,
                params,
                policy: self.policy,
                should_poll: self.should_poll,
            },
            transport: self.transport.unwrap_or_else(default_transport),
            callbacks: Mutex::new(Some(self.callbacks)),
            control: Control::new(),
        }))
    }
}
