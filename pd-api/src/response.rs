//! Server response types.
//!
//! PostDeck list endpoints answer either with a bare JSON array or with the
//! array wrapped in a `data` envelope:
//! ```json
//! { "data": [ ... ], "message": "ok" }
//! ```

use serde::{Deserialize, Serialize};

/// Standard `data` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// Response payload.
    pub data: T,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A list body in either accepted shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Bare(Vec<T>),
    Enveloped(DataEnvelope<Vec<T>>),
}

impl<T> ListResponse<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) => items,
            Self::Enveloped(envelope) => envelope.data,
        }
    }
}

/// Error body some endpoints return alongside a 4xx/5xx status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best message from a raw error body, falling back to the raw text.
    pub fn describe(raw: &str) -> String {
        serde_json::from_str::<ErrorBody>(raw)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| raw.trim().to_string())
    }
}
