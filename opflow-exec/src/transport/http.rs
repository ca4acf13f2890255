use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use super::{build_client, RequestParts, ResponseParts, TransportError, DEFAULT_MAX_RESPONSE_BYTES};

/// One buffered request/response exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: RequestParts, timeout: Duration) -> Result<ResponseParts, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::with_client(build_client())
    }
}

impl ReqwestTransport {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn max_response_bytes(mut self, max_bytes: usize) -> Self {
        self.max_response_bytes = max_bytes;
        self
    }
}

/// Process-wide transport used by builders that were not given one.
pub fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT: OnceLock<Arc<ReqwestTransport>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(ReqwestTransport::default()))
        .clone()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, req: RequestParts, timeout: Duration) -> Result<ResponseParts, TransportError> {
        let method = parse_method(&req.method)?;
        let mut rb = self.client.request(method, req.url).timeout(timeout);

        for (k, v) in req.headers {
            rb = rb.header(k, v);
        }

        rb = rb.body(req.body);

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        read_response(resp, self.max_response_bytes).await
    }
}

pub(crate) fn parse_method(method: &str) -> Result<reqwest::Method, TransportError> {
    method
        .parse()
        .map_err(|e: <reqwest::Method as std::str::FromStr>::Err| TransportError::Other(e.to_string()))
}

pub(crate) async fn read_response(
    resp: reqwest::Response,
    max_response_bytes: usize,
) -> Result<ResponseParts, TransportError> {
    let status = resp.status().as_u16();

    if resp.content_length().is_some_and(|len| len > max_response_bytes as u64) {
        return Err(TransportError::ResponseTooLarge { max_bytes: max_response_bytes });
    }

    let mut headers = BTreeMap::new();
    for (k, v) in resp.headers().iter() {
        if let Ok(s) = v.to_str() {
            headers.insert(k.to_string(), s.to_string());
        }
    }

    let body = resp.bytes().await.map_err(map_reqwest_error)?;
    if body.len() > max_response_bytes {
        return Err(TransportError::ResponseTooLarge { max_bytes: max_response_bytes });
    }

    Ok(ResponseParts {
        status,
        headers,
        body: body.to_vec(),
    })
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return TransportError::Network(e.to_string());
    }
    TransportError::Other(e.to_string())
}
