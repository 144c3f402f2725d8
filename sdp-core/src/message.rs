//! Wire messages exchanged between the controller and members.
//!
//! Every message is a JSON object `{"action": "...", "data": ...}` carried in
//! one frame. `data` is omitted for actions that carry nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::AccessEntry;
use crate::credential::Credentials;

/// Actions a member may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundAction {
    CredentialUpdateRequest,
    CredentialUpdateAck,
    KeepAlive,
    AccessRefreshRequest,
    AccessUpdateRequest,
    AccessAck,
}

impl InboundAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundAction::CredentialUpdateRequest => "credential_update_request",
            InboundAction::CredentialUpdateAck => "credential_update_ack",
            InboundAction::KeepAlive => "keep_alive",
            InboundAction::AccessRefreshRequest => "access_refresh_request",
            InboundAction::AccessUpdateRequest => "access_update_request",
            InboundAction::AccessAck => "access_ack",
        }
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Inbound {
    pub action: InboundAction,
    #[serde(default)]
    pub data: Option<Value>,
}

/// An inbound frame that is not a recognised message.
#[derive(Debug, thiserror::Error)]
#[error("malformed message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl Inbound {
    /// Decode one frame payload.
    ///
    /// Invalid JSON, a non-object document, a missing `action` and an
    /// unrecognised `action` are all the same error to the caller.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Messages the controller sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    /// The member's credentials are current.
    CredentialsGood,
    /// Freshly generated credentials, not yet stored.
    CredentialUpdate(Credentials),
    /// Credential generation failed; the member may ask again.
    CredentialUpdateError(String),
    KeepAlive,
    /// Every member reachable through the requesting gateway.
    AccessRefresh(Vec<AccessEntry>),
    /// The directory could not answer; the member may ask again.
    AccessRefreshError(String),
    /// Echo of a frame that could not be interpreted.
    BadMessage(String),
    DatabaseError,
    UnknownSdpId,
}

impl Outbound {
    /// The `action` field this message is sent with.
    pub fn action(&self) -> &'static str {
        match self {
            Outbound::CredentialsGood => "credentials_good",
            Outbound::CredentialUpdate(_) => "credential_update",
            Outbound::CredentialUpdateError(_) => "credential_update_error",
            Outbound::KeepAlive => "keep_alive",
            Outbound::AccessRefresh(_) => "access_refresh",
            Outbound::AccessRefreshError(_) => "access_refresh_error",
            Outbound::BadMessage(_) => "bad_message",
            Outbound::DatabaseError => "database_error",
            Outbound::UnknownSdpId => "unknown_sdp_id",
        }
    }

    /// Serialize to the JSON payload of one frame.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
