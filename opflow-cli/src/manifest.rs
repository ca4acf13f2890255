//! Manifest file: the list of operations `opflow run` executes.
//!
//! ```yaml
//! max_concurrent: 2
//! preset: foreground
//! operations:
//!   - id: create-report
//!     url: https://api.example.com/reports
//!     method: POST
//!     body: { "kind": "daily" }
//!   - id: wait-for-report
//!     url: https://api.example.com/reports/latest
//!     policy: { poll_interval_ms: 2000, max_poll_attempts: 10 }
//!     poll_while: { pointer: /status, equals: pending }
//!   - id: upload-log
//!     kind: upload
//!     url: https://uploads.example.com/logs
//!     file: ./build.log
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use opflow_core::{OperationPolicy, Preset, UploadPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML parse failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub operations: Vec<OperationEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    #[default]
    Request,
    Upload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationEntry {
    pub id: String,
    #[serde(default)]
    pub kind: OperationKind,
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Requests send it as JSON; uploads send strings verbatim and anything
    /// else serialised.
    #[serde(default)]
    pub body: Option<JsonValue>,
    /// Upload payload, relative to the manifest's directory.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub policy: PolicyOverrides,
    #[serde(default)]
    pub poll_while: Option<PollWhile>,
}

/// Per-operation changes on top of the preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverrides {
    pub retry_wait_ms: Option<i64>,
    pub decay_factor: Option<f64>,
    pub max_retry_wait_ms: Option<i64>,
    pub max_retry_attempts: Option<i64>,
    pub poll_interval_ms: Option<i64>,
    pub max_poll_attempts: Option<i64>,
    pub start_delay_ms: Option<i64>,
    pub timeout_ms: Option<u64>,
}

impl PolicyOverrides {
    pub fn apply(&self, base: OperationPolicy) -> OperationPolicy {
        OperationPolicy {
            retry_wait_ms: self.retry_wait_ms.unwrap_or(base.retry_wait_ms),
            decay_factor: self.decay_factor.unwrap_or(base.decay_factor),
            max_retry_wait_ms: self.max_retry_wait_ms.unwrap_or(base.max_retry_wait_ms),
            max_retry_attempts: self.max_retry_attempts.unwrap_or(base.max_retry_attempts),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            max_poll_attempts: self.max_poll_attempts.unwrap_or(base.max_poll_attempts),
            start_delay_ms: self.start_delay_ms.unwrap_or(base.start_delay_ms),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
        }
    }

    fn touches_retry_or_poll(&self) -> bool {
        self.retry_wait_ms.is_some()
            || self.decay_factor.is_some()
            || self.max_retry_wait_ms.is_some()
            || self.max_retry_attempts.is_some()
            || self.poll_interval_ms.is_some()
            || self.max_poll_attempts.is_some()
    }
}

/// Keep polling while the value at `pointer` (RFC 6901) equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollWhile {
    pub pointer: String,
    pub equals: JsonValue,
}

impl PollWhile {
    pub fn matches(&self, body: &JsonValue) -> bool {
        body.pointer(&self.pointer) == Some(&self.equals)
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<(Manifest, ManifestFormat), ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let (mut manifest, format) = Self::parse_str(&content)?;
        if let Some(base) = path.parent() {
            manifest.resolve_files(base);
        }
        Ok((manifest, format))
    }

    /// Auto-detects JSON (leading `{`) and falls back to YAML.
    pub fn parse_str(input: &str) -> Result<(Manifest, ManifestFormat), ManifestError> {
        if input.trim_start().starts_with('{') {
            return match serde_json::from_str::<Manifest>(input) {
                Ok(m) => Ok((m, ManifestFormat::Json)),
                // YAML is a superset of JSON; report the JSON error if both fail.
                Err(e) => serde_yaml::from_str::<Manifest>(input)
                    .map(|m| (m, ManifestFormat::Yaml))
                    .map_err(|_| ManifestError::Json(e)),
            };
        }
        Ok((serde_yaml::from_str::<Manifest>(input)?, ManifestFormat::Yaml))
    }

    fn resolve_files(&mut self, base: &Path) {
        for op in &mut self.operations {
            if let Some(file) = op.file.as_mut() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
    }

    /// Default preset for operations without their own: CLI flag, then manifest.
    pub fn default_preset(&self, cli: Option<Preset>) -> Preset {
        cli.or(self.preset).unwrap_or_default()
    }

    /// Every problem found, each prefixed with the operation it belongs to.
    pub fn validate(&self, cli_preset: Option<Preset>) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_concurrent == Some(0) {
            errors.push("max_concurrent must be at least 1".to_string());
        }

        let default_preset = self.default_preset(cli_preset);
        let mut seen = BTreeSet::new();
        for (i, op) in self.operations.iter().enumerate() {
            let label = if op.id.is_empty() {
                format!("operations[{i}]")
            } else {
                format!("operations[{i}] ({})", op.id)
            };
            for problem in op.problems(default_preset) {
                errors.push(format!("{label}: {problem}"));
            }
            if !op.id.is_empty() && !seen.insert(op.id.as_str()) {
                errors.push(format!("{label}: duplicate id"));
            }
        }
        errors
    }
}

impl OperationEntry {
    pub fn request_policy(&self, default_preset: Preset) -> OperationPolicy {
        self.policy.apply(self.preset.unwrap_or(default_preset).policy())
    }

    pub fn upload_policy(&self, default_preset: Preset) -> UploadPolicy {
        let base = self.preset.unwrap_or(default_preset).policy();
        UploadPolicy {
            start_delay_ms: self.policy.start_delay_ms.unwrap_or(base.start_delay_ms),
            timeout_ms: self.policy.timeout_ms.unwrap_or(UploadPolicy::default().timeout_ms),
        }
    }

    /// Upload bytes from `body` (files are read when the transfer starts).
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body.as_ref().map(|b| match b {
            JsonValue::String(s) => s.clone().into_bytes(),
            other => other.to_string().into_bytes(),
        })
    }

    fn problems(&self, default_preset: Preset) -> Vec<String> {
        let mut out = Vec::new();
        if self.id.trim().is_empty() {
            out.push("id must not be empty".to_string());
        }
        if let Err(e) = url::Url::parse(&self.url) {
            out.push(format!("invalid url {:?}: {e}", self.url));
        }
        if let Some(method) = &self.method {
            if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
                out.push(format!("invalid method {method:?}"));
            }
        }

        match self.kind {
            OperationKind::Request => {
                if self.file.is_some() {
                    out.push("file is only valid for uploads".to_string());
                }
                let policy = self.request_policy(default_preset);
                if let Err(e) = policy.validate(self.poll_while.is_some()) {
                    out.push(e.to_string());
                }
                if self.poll_while.is_some() && !policy.polling_enabled() {
                    out.push("poll_while needs poll_interval_ms and max_poll_attempts".to_string());
                }
            }
            OperationKind::Upload => {
                match (&self.file, &self.body) {
                    (None, None) => out.push("upload needs a file or a body".to_string()),
                    (Some(_), Some(_)) => out.push("upload takes either file or body, not both".to_string()),
                    _ => {}
                }
                if self.policy.touches_retry_or_poll() || self.poll_while.is_some() {
                    out.push("uploads do not retry or poll".to_string());
                }
            }
        }
        out
    }
}
