use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::http::{map_reqwest_error, parse_method, read_response};
use super::{build_client, RequestParts, ResponseParts, TransportError, DEFAULT_MAX_RESPONSE_BYTES};

/// Raw progress tick reported by an upload transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub loaded: u64,
    /// `None` when the payload length is not known up front.
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// `floor(loaded * 100 / total)`, or `None` for indeterminate transfers.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        let pct = (u128::from(self.loaded) * 100 / u128::from(total)).min(100);
        Some(pct as u8)
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Streaming transfer of a binary payload.
///
/// Implementations report progress through `progress`; send errors on it can be
/// ignored (the receiving operation has gone away). Dropping the returned future
/// must abort the transfer.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        req: RequestParts,
        timeout: Duration,
        progress: ProgressSender,
    ) -> Result<ResponseParts, TransportError>;
}

pub struct ReqwestUploadTransport {
    client: reqwest::Client,
    chunk_size: usize,
    max_response_bytes: usize,
}

impl Default for ReqwestUploadTransport {
    fn default() -> Self {
        Self::with_client(build_client())
    }
}

impl ReqwestUploadTransport {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            chunk_size: 64 * 1024,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    /// Granularity of progress ticks.
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn max_response_bytes(mut self, max_bytes: usize) -> Self {
        self.max_response_bytes = max_bytes;
        self
    }
}

pub fn default_upload_transport() -> Arc<dyn UploadTransport> {
    static DEFAULT: OnceLock<Arc<ReqwestUploadTransport>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Arc::new(ReqwestUploadTransport::default()))
        .clone()
}

#[async_trait]
impl UploadTransport for ReqwestUploadTransport {
    async fn upload(
        &self,
        req: RequestParts,
        timeout: Duration,
        progress: ProgressSender,
    ) -> Result<ResponseParts, TransportError> {
        let method = parse_method(&req.method)?;
        let total = req.body.len() as u64;

        let chunks: Vec<Vec<u8>> = req.body.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        let mut loaded = 0u64;
        // Ticks fire as hyper pulls each chunk off the stream.
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            loaded += chunk.len() as u64;
            let _ = progress.send(ProgressEvent {
                loaded,
                total: Some(total),
            });
            Ok::<_, std::io::Error>(chunk)
        }));

        let mut rb = self
            .client
            .request(method, req.url)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_LENGTH, total);

        for (k, v) in req.headers {
            rb = rb.header(k, v);
        }

        rb = rb.body(reqwest::Body::wrap_stream(stream));

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        read_response(resp, self.max_response_bytes).await
    }
}
