//! Result payloads returned by a dispatch.
//!
//! Exactly one payload is produced per executed cell. The serialized shape is
//! what the notebook editor consumes:
//!
//! ```json
//! {"output": {"type": "plot", "content": "", "data": {"image/png": "iVBOR..."}}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// MIME key for inline PNG images.
pub const MIME_PNG: &str = "image/png";

/// MIME key for raw HTML.
pub const MIME_HTML: &str = "text/html";

/// Kind of output carried by a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Text,
    Error,
    Html,
    Plot,
}

/// A single cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// Output kind.
    #[serde(rename = "type")]
    pub kind: OutputKind,

    /// Human-readable text or trace.
    pub content: String,

    /// Keyed payloads (MIME type -> encoded data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
}

/// The structured result of one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub output: Output,
}

impl ResultPayload {
    fn new(kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            output: Output {
                kind,
                content: content.into(),
                data: None,
            },
        }
    }

    /// Plain text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Text, content)
    }

    /// Error output (trace or message).
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, content)
    }

    /// Error output built from a kernel error.
    pub fn from_error(err: &Error) -> Self {
        Self::error(err.trace())
    }

    /// Raw HTML, carried both as content and under `text/html`.
    pub fn html(body: impl Into<String>) -> Self {
        let body = body.into();
        let mut payload = Self::new(OutputKind::Html, body.clone());
        payload.output.data = Some(BTreeMap::from([(
            MIME_HTML.to_string(),
            serde_json::Value::String(body),
        )]));
        payload
    }

    /// Plot output: captured stdout plus a base64-encoded PNG.
    pub fn plot(stdout: impl Into<String>, png_base64: String) -> Self {
        let mut payload = Self::new(OutputKind::Plot, stdout);
        payload.output.data = Some(BTreeMap::from([(
            MIME_PNG.to_string(),
            serde_json::Value::String(png_base64),
        )]));
        payload
    }

    pub fn kind(&self) -> OutputKind {
        self.output.kind
    }

    pub fn content(&self) -> &str {
        &self.output.content
    }

    pub fn is_error(&self) -> bool {
        self.output.kind == OutputKind::Error
    }

    /// Look up a keyed data entry as a string.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.output
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(|value| value.as_str())
    }
}
