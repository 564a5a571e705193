//! Status query engine
//!
//! A status query gathers [`Observations`] from the target, the hub and
//! (when needed) the hub's view of the origin, then resolves them with
//! [`resolve_status`]. Reads stop as soon as a later one can no longer change
//! the answer, so a delivered message costs a single read.

use tracing::{debug, warn};

use crate::error::TrackerError;
use crate::indexer::{furthest_status, EventHistory};
use crate::route::Route;
use crate::types::{EventMetadata, Message, MessageStatus};

/// Chain facts a status is resolved from; `None` means not read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observations {
    /// Delivery receipt on the target chain
    pub target_receipt: Option<EventMetadata>,
    /// Current target chain time
    pub target_timestamp: Option<u64>,
    /// Delivery receipt on the hub
    pub hub_receipt: Option<EventMetadata>,
    /// Hub height verified by the target
    pub hub_height_on_target: Option<u64>,
    /// Origin height verified by the hub
    pub origin_height_on_hub: Option<u64>,
}

/// Resolve observations into a status
///
/// Rules apply in order: target delivery, elapsed timeout, hub delivery
/// finalized on the target, hub delivery, origin height verified by the hub.
/// A `reference_height` of 0 means the origin height is unknown and
/// `SourceFinalized` is never reported.
pub fn resolve_status(
    timeout_timestamp: u64,
    reference_height: u64,
    observations: &Observations,
) -> MessageStatus {
    if let Some(meta) = &observations.target_receipt {
        return MessageStatus::DestinationDelivered { meta: meta.clone() };
    }

    if let Some(now) = observations.target_timestamp {
        if timeout_timestamp != 0 && now >= timeout_timestamp {
            return MessageStatus::Timeout;
        }
    }

    if let Some(meta) = &observations.hub_receipt {
        return match observations.hub_height_on_target {
            Some(height) if height >= meta.block_number => MessageStatus::HyperbridgeFinalized {
                finalized_height: height,
            },
            _ => MessageStatus::HyperbridgeDelivered { meta: meta.clone() },
        };
    }

    match observations.origin_height_on_hub {
        Some(height) if reference_height != 0 && height >= reference_height => {
            MessageStatus::SourceFinalized {
                finalized_height: height,
            }
        }
        _ => MessageStatus::Pending,
    }
}

/// Read the chain facts needed to resolve `message`
pub async fn observe(
    route: &Route,
    message: &Message,
    reference_height: u64,
) -> Result<Observations, TrackerError> {
    let commitment = message.commitment();
    let is_response = message.is_response();
    let timeout = message.timeout_timestamp();
    let mut observations = Observations::default();

    observations.target_receipt = route.target_receipt(is_response, commitment).await?;
    if observations.target_receipt.is_some() {
        return Ok(observations);
    }

    if timeout != 0 {
        let now = route.target_timestamp().await?;
        observations.target_timestamp = Some(now);
        if now >= timeout {
            return Ok(observations);
        }
    }

    observations.hub_receipt = route.hub_receipt(is_response, commitment).await?;
    if observations.hub_receipt.is_some() {
        observations.hub_height_on_target = Some(route.hub_height_on_target().await?);
    } else if reference_height != 0 {
        observations.origin_height_on_hub = Some(route.origin_height_on_hub().await?);
    }

    Ok(observations)
}

/// One-shot status of `message`
///
/// An indexer, when given, is consulted first. A recorded terminal event is
/// returned directly; otherwise the recorded milestone is a floor under the
/// chain-derived status. Indexer failures only cost the shortcut.
pub async fn query_status(
    route: &Route,
    indexer: Option<&dyn EventHistory>,
    message: &Message,
    reference_height: u64,
) -> Result<MessageStatus, TrackerError> {
    let commitment = message.commitment();

    let mut floor = None;
    if let Some(indexer) = indexer {
        match indexer.get_event_history(commitment).await {
            Ok(history) => {
                floor = furthest_status(&history);
                if let Some(status) = floor.as_ref().filter(|s| s.is_terminal()) {
                    debug!(commitment = %commitment, status = %status, "Indexer recorded terminal status");
                    return Ok(status.clone());
                }
            }
            Err(e) => {
                warn!(commitment = %commitment, error = %e, "Indexer query failed, reading chains");
            }
        }
    }

    let observations = observe(route, message, reference_height).await?;
    let status = resolve_status(message.timeout_timestamp(), reference_height, &observations);

    let status = match floor {
        Some(recorded) if recorded.milestone() > status.milestone() => recorded,
        _ => status,
    };

    debug!(
        commitment = %commitment,
        origin = %route.origin_config.state_machine_id,
        target = %route.target_config.state_machine_id,
        status = %status,
        "Resolved message status"
    );
    Ok(status)
}
