//! Message and status types for cross-chain lifecycle tracking
//!
//! Everything here is a plain value type: requests and responses are owned by
//! the caller, statuses are produced fresh on every query or stream tick.
//! Byte fields serialize as `0x`-prefixed hex so the JSON boundary is lossless.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TrackerError;
use crate::hash::{compute_request_commitment, compute_response_commitment};

// ============================================================================
// Commitment (32 bytes)
// ============================================================================

/// Keccak-256 commitment identifying a message across chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut result = [0u8; 32];
        hex::decode_to_slice(hex, &mut result)?;
        Ok(Commitment(result))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Commitment {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Commitment::from_hex(s)
    }
}

impl From<[u8; 32]> for Commitment {
    fn from(bytes: [u8; 32]) -> Self {
        Commitment(bytes)
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Commitment::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Vec<u8>` fields encoded as `0x` hex strings
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A cross-chain post request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequest {
    /// State machine the request was dispatched from
    pub source: String,
    /// State machine the request is addressed to
    pub dest: String,
    /// Per-source sequence number
    pub nonce: u64,
    /// Sending module
    #[serde(with = "hex_bytes")]
    pub from: Vec<u8>,
    /// Receiving module
    #[serde(with = "hex_bytes")]
    pub to: Vec<u8>,
    /// Unix seconds after which the request may be timed out, 0 for never
    pub timeout_timestamp: u64,
    #[serde(with = "hex_bytes")]
    pub body: Vec<u8>,
    /// Source block height the request was emitted at. Not part of the commitment.
    #[serde(default, alias = "txHeight")]
    pub height: u64,
}

impl PostRequest {
    /// Commitment over the request fields
    pub fn commitment(&self) -> Commitment {
        compute_request_commitment(
            &self.source,
            &self.dest,
            self.nonce,
            self.timeout_timestamp,
            &self.from,
            &self.to,
            &self.body,
        )
    }

    /// Structural checks performed before any chain read
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.source.trim().is_empty() {
            return Err(TrackerError::MalformedMessage(
                "request source is empty".to_string(),
            ));
        }
        if self.dest.trim().is_empty() {
            return Err(TrackerError::MalformedMessage(
                "request dest is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A response to a [`PostRequest`], travelling back from the request's destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub post: PostRequest,
    #[serde(with = "hex_bytes")]
    pub response: Vec<u8>,
    /// Timeout for the response leg, 0 for never
    pub response_timeout_timestamp: u64,
}

impl PostResponse {
    /// Commitment over the request fields followed by the response fields
    pub fn commitment(&self) -> Commitment {
        let post = &self.post;
        compute_response_commitment(
            &post.source,
            &post.dest,
            post.nonce,
            post.timeout_timestamp,
            &post.from,
            &post.to,
            &post.body,
            &self.response,
            self.response_timeout_timestamp,
        )
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        self.post.validate()
    }
}

/// Either leg of a cross-chain exchange
///
/// Deserializes untagged: an object with a `post` field is a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Response(PostResponse),
    Request(PostRequest),
}

impl Message {
    pub fn commitment(&self) -> Commitment {
        match self {
            Message::Request(req) => req.commitment(),
            Message::Response(res) => res.commitment(),
        }
    }

    /// State machine this message leaves from
    pub fn origin(&self) -> &str {
        match self {
            Message::Request(req) => &req.source,
            Message::Response(res) => &res.post.dest,
        }
    }

    /// State machine this message must be delivered to
    pub fn target(&self) -> &str {
        match self {
            Message::Request(req) => &req.dest,
            Message::Response(res) => &res.post.source,
        }
    }

    /// Timeout governing this leg
    pub fn timeout_timestamp(&self) -> u64 {
        match self {
            Message::Request(req) => req.timeout_timestamp,
            Message::Response(res) => res.response_timeout_timestamp,
        }
    }

    /// Origin height recorded with the message, when known
    pub fn height(&self) -> u64 {
        match self {
            Message::Request(req) => req.height,
            // The response's emission height is not part of the data model
            Message::Response(_) => 0,
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        match self {
            Message::Request(req) => req.validate(),
            Message::Response(res) => res.validate(),
        }
    }
}

impl From<PostRequest> for Message {
    fn from(request: PostRequest) -> Self {
        Message::Request(request)
    }
}

impl From<PostResponse> for Message {
    fn from(response: PostResponse) -> Self {
        Message::Response(response)
    }
}

// ============================================================================
// Statuses
// ============================================================================

/// Where on a chain a lifecycle event was observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl EventMetadata {
    /// Metadata for an observation where only the height is known
    pub fn at_height(block_number: u64) -> Self {
        Self {
            block_number,
            ..Default::default()
        }
    }
}

/// Delivery lifecycle of a request or response
///
/// Milestones only move forward: Pending(0) < SourceFinalized(1) <
/// HyperbridgeDelivered(2) < HyperbridgeFinalized(3) < DestinationDelivered/Timeout(4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MessageStatus {
    /// Observed, origin block not finalized yet
    Pending,
    /// Hub has verified the origin chain up to `finalized_height`
    SourceFinalized {
        #[serde(rename = "finalizedHeight")]
        finalized_height: u64,
    },
    /// Hub holds a receipt for the message commitment
    HyperbridgeDelivered { meta: EventMetadata },
    /// Destination has verified the hub up to `finalized_height`, covering the delivery
    HyperbridgeFinalized {
        #[serde(rename = "finalizedHeight")]
        finalized_height: u64,
    },
    /// Executed on the destination chain
    DestinationDelivered { meta: EventMetadata },
    /// Timeout elapsed without destination delivery
    Timeout,
}

impl MessageStatus {
    /// Position of this status in the lifecycle
    pub fn milestone(&self) -> u8 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::SourceFinalized { .. } => 1,
            MessageStatus::HyperbridgeDelivered { .. } => 2,
            MessageStatus::HyperbridgeFinalized { .. } => 3,
            MessageStatus::DestinationDelivered { .. } | MessageStatus::Timeout => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageStatus::DestinationDelivered { .. } | MessageStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "Pending",
            MessageStatus::SourceFinalized { .. } => "SourceFinalized",
            MessageStatus::HyperbridgeDelivered { .. } => "HyperbridgeDelivered",
            MessageStatus::HyperbridgeFinalized { .. } => "HyperbridgeFinalized",
            MessageStatus::DestinationDelivered { .. } => "DestinationDelivered",
            MessageStatus::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a timed-out request towards a relayable timeout message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TimeoutStatus {
    Pending,
    /// Hub verified a destination height whose timestamp is past the timeout
    DestinationFinalized { meta: EventMetadata },
    /// Hub recorded the timeout
    HyperbridgeTimedout { meta: EventMetadata },
    /// Source chain verified the hub block holding the timeout record
    HyperbridgeFinalized { meta: EventMetadata },
    /// Calldata ready to submit to the source chain's handler
    TimeoutMessage {
        #[serde(with = "hex_bytes")]
        calldata: Vec<u8>,
    },
    Error { description: String },
}

impl TimeoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TimeoutStatus::TimeoutMessage { .. } | TimeoutStatus::Error { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutStatus::Pending => "Pending",
            TimeoutStatus::DestinationFinalized { .. } => "DestinationFinalized",
            TimeoutStatus::HyperbridgeTimedout { .. } => "HyperbridgeTimedout",
            TimeoutStatus::HyperbridgeFinalized { .. } => "HyperbridgeFinalized",
            TimeoutStatus::TimeoutMessage { .. } => "TimeoutMessage",
            TimeoutStatus::Error { .. } => "Error",
        }
    }
}

impl fmt::Display for TimeoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the numeric suffix of a state machine id, e.g. `POLKADOT-3367` -> 3367
///
/// Hosts address verified state machines by this number.
pub fn state_machine_numeric_id(state_machine: &str) -> Option<u64> {
    state_machine
        .rsplit_once('-')
        .and_then(|(_, id)| id.parse().ok())
}
