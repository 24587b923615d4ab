//! Frame codec: outbound intents to wire text, wire text to typed inbound frames.
//!
//! Every frame is a JSON object tagged by `type`. Decoding never panics and
//! never tears down the connection; a bad frame yields a [`DecodeError`]
//! and the caller drops it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pd_core::error::{PdError, PdResult};
use pd_models::{FriendRequest, FriendRequestStatus, Message};

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundFrame {
    #[serde(rename_all = "camelCase")]
    Auth {
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        from_user_id: String,
        to_user_id: String,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestResponse {
        request_id: String,
        status: FriendRequestStatus,
    },
}

impl OutboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Message { .. } => "message",
            Self::FriendRequestResponse { .. } => "friendRequestResponse",
        }
    }
}

impl From<&Message> for OutboundFrame {
    fn from(m: &Message) -> Self {
        Self::Message {
            from_user_id: m.from_user_id.clone(),
            to_user_id: m.to_user_id.clone(),
            content: m.content.clone(),
        }
    }
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundFrame {
    AuthAck {},
    AuthError {
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: Message,
    },
    FriendRequest {
        request: FriendRequest,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestResponse {
        request_id: String,
        status: FriendRequestStatus,
    },
    #[serde(rename_all = "camelCase")]
    UserStatus {
        user_id: String,
        is_online: bool,
    },
}

impl InboundFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthAck {} => "authAck",
            Self::AuthError { .. } => "authError",
            Self::Message { .. } => "message",
            Self::FriendRequest { .. } => "friendRequest",
            Self::FriendRequestResponse { .. } => "friendRequestResponse",
            Self::UserStatus { .. } => "userStatus",
        }
    }

    /// Whether the frame belongs to the auth handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::AuthAck {} | Self::AuthError { .. })
    }
}

/// Inbound `type` tags this codec understands.
pub const INBOUND_TYPES: &[&str] = &[
    "authAck",
    "authError",
    "message",
    "friendRequest",
    "friendRequestResponse",
    "userStatus",
];

/// Why an inbound frame was dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The frame was not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame had no string `type` field.
    #[error("frame has no type")]
    MissingType,

    /// The `type` is not one this codec handles.
    #[error("unknown frame type: {0}")]
    UnknownType(String),

    /// A known frame type with missing or ill-typed fields.
    #[error("invalid {frame_type} frame: {reason}")]
    InvalidPayload { frame_type: String, reason: String },
}

impl From<DecodeError> for PdError {
    fn from(e: DecodeError) -> Self {
        PdError::Decode(e.to_string())
    }
}

/// Wire format strategy. Swappable so the same state machine and dispatcher
/// can sit on top of a different framing.
pub trait FrameCodec: Send + Sync {
    fn encode(&self, frame: &OutboundFrame) -> PdResult<String>;
    fn decode(&self, raw: &str) -> Result<InboundFrame, DecodeError>;
}

/// The JSON envelope format spoken by the PostDeck server.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn encode(&self, frame: &OutboundFrame) -> PdResult<String> {
        Ok(serde_json::to_string(frame)?)
    }

    fn decode(&self, raw: &str) -> Result<InboundFrame, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if !value.is_object() {
            return Err(DecodeError::Malformed("expected a JSON object".into()));
        }

        let frame_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(DecodeError::MissingType)?
            .to_string();

        if !INBOUND_TYPES.contains(&frame_type.as_str()) {
            return Err(DecodeError::UnknownType(frame_type));
        }

        serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload {
            frame_type,
            reason: e.to_string(),
        })
    }
}
