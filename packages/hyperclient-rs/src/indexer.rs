//! Indexer acceleration path
//!
//! An indexer mirrors host events into a queryable store. When one is
//! configured the status engine asks it for the recorded history of a
//! commitment before touching the chains. Its answers only ever speed things
//! up; a missing or failing indexer leaves results unchanged.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::ChainError;
use crate::redact::redact_url;
use crate::types::{Commitment, EventMetadata, MessageStatus};

/// Lifecycle stages an indexer records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedStatus {
    /// Dispatched on the origin chain
    Source,
    HyperbridgeDelivered,
    HyperbridgeFinalized,
    Destination,
    HyperbridgeTimedOut,
    TimedOut,
}

impl RecordedStatus {
    /// Parse the indexer's status label; unknown labels are skipped
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "SOURCE" => Some(Self::Source),
            "HYPERBRIDGE_DELIVERED" => Some(Self::HyperbridgeDelivered),
            "HYPERBRIDGE_FINALIZED" => Some(Self::HyperbridgeFinalized),
            "DESTINATION" => Some(Self::Destination),
            "HYPERBRIDGE_TIMED_OUT" => Some(Self::HyperbridgeTimedOut),
            "TIMED_OUT" => Some(Self::TimedOut),
            _ => None,
        }
    }
}

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub status: RecordedStatus,
    pub meta: EventMetadata,
}

impl LifecycleEvent {
    /// The message status this event proves
    pub fn as_message_status(&self) -> MessageStatus {
        match self.status {
            RecordedStatus::Source => MessageStatus::Pending,
            RecordedStatus::HyperbridgeDelivered => MessageStatus::HyperbridgeDelivered {
                meta: self.meta.clone(),
            },
            RecordedStatus::HyperbridgeFinalized => MessageStatus::HyperbridgeFinalized {
                finalized_height: self.meta.block_number,
            },
            RecordedStatus::Destination => MessageStatus::DestinationDelivered {
                meta: self.meta.clone(),
            },
            RecordedStatus::HyperbridgeTimedOut | RecordedStatus::TimedOut => {
                MessageStatus::Timeout
            }
        }
    }
}

/// Furthest status proven by a history, if any
pub fn furthest_status(history: &[LifecycleEvent]) -> Option<MessageStatus> {
    history
        .iter()
        .map(LifecycleEvent::as_message_status)
        .max_by_key(MessageStatus::milestone)
}

/// Keyed lookup of recorded lifecycle events
#[async_trait]
pub trait EventHistory: Send + Sync {
    /// Events recorded for `commitment`, oldest first
    async fn get_event_history(
        &self,
        commitment: Commitment,
    ) -> Result<Vec<LifecycleEvent>, ChainError>;
}

const HISTORY_QUERY: &str = r#"
query History($commitment: String!) {
  requests(filter: { commitment: { equalTo: $commitment } }) {
    nodes { statusMetadata(orderBy: TIMESTAMP_ASC) { nodes { status blockNumber blockHash transactionHash } } }
  }
  responses(filter: { commitment: { equalTo: $commitment } }) {
    nodes { statusMetadata(orderBy: TIMESTAMP_ASC) { nodes { status blockNumber blockHash transactionHash } } }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// [`EventHistory`] over an indexer's GraphQL endpoint
pub struct IndexerClient {
    url: String,
    client: reqwest::Client,
}

impl IndexerClient {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        debug!(url = %redact_url(&url), "Created indexer client");
        Self { url, client }
    }
}

#[async_trait]
impl EventHistory for IndexerClient {
    async fn get_event_history(
        &self,
        commitment: Commitment,
    ) -> Result<Vec<LifecycleEvent>, ChainError> {
        let body = serde_json::json!({
            "query": HISTORY_QUERY,
            "variables": { "commitment": commitment.to_hex() },
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json::<GraphQlResponse>()
            .await?;

        if let Some(error) = response.errors.first() {
            return Err(ChainError::Rpc {
                code: -1,
                message: error.message.clone(),
            });
        }

        Ok(response.data.as_ref().map(parse_history).unwrap_or_default())
    }
}

/// Extract events from the `requests`/`responses` query result
fn parse_history(data: &Value) -> Vec<LifecycleEvent> {
    let mut events = Vec::new();
    for entity in ["requests", "responses"] {
        let nodes = data[entity]["nodes"].as_array().cloned().unwrap_or_default();
        for node in nodes {
            let metadata = node["statusMetadata"]["nodes"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            for record in metadata {
                let Some(status) = record["status"].as_str().and_then(RecordedStatus::parse)
                else {
                    continue;
                };
                // Block numbers arrive as strings or numbers depending on the schema
                let block_number = match &record["blockNumber"] {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                }
                .unwrap_or_default();

                events.push(LifecycleEvent {
                    status,
                    meta: EventMetadata {
                        block_number,
                        block_hash: record["blockHash"].as_str().map(str::to_string),
                        transaction_hash: record["transactionHash"].as_str().map(str::to_string),
                    },
                });
            }
        }
    }
    events
}
