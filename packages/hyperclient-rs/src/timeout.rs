//! Timeout stream engine
//!
//! Walks a timed-out request through the steps needed before the source chain
//! will accept a timeout: the hub must verify a destination height past the
//! timeout, record the timeout itself, and have that record verified by the
//! source. The stream then yields the calldata to relay and ends.
//!
//! The stream is lazy and holds no tasks; each stage polls until its
//! condition holds. Dropping the stream cancels any pending read or sleep.

use futures::stream::{self, Stream};
use std::time::Duration;
use tracing::{debug, info};

use crate::calldata::encode_timeout_calldata;
use crate::error::TrackerError;
use crate::route::Route;
use crate::types::{Commitment, EventMetadata, PostRequest, TimeoutStatus};

#[derive(Debug)]
enum Stage {
    Start,
    DestinationFinalized,
    HyperbridgeTimedout,
    HyperbridgeFinalized { record: EventMetadata },
    TimeoutMessage { hub_height: u64 },
    Failed(String),
    Done,
}

struct TimeoutTracker {
    route: Route,
    request: PostRequest,
    commitment: Commitment,
    poll_interval: Duration,
}

impl TimeoutTracker {
    /// Hub has verified a destination height whose timestamp is past the timeout
    async fn await_destination_finalized(&self) -> Result<Result<u64, String>, TrackerError> {
        let timeout = self.request.timeout_timestamp;
        loop {
            if let Some(meta) = self.route.target_receipt(false, self.commitment).await? {
                return Ok(Err(format!(
                    "request was delivered to {} at block {}",
                    self.route.target_config.state_machine_id, meta.block_number
                )));
            }

            let height = self.route.target_height_on_hub().await?;
            if height > 0 {
                let timestamp = self.route.target_timestamp_on_hub(height).await?;
                if timestamp >= timeout {
                    return Ok(Ok(height));
                }
                debug!(height, timestamp, timeout, "Destination not yet past timeout on hub");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn await_hub_timeout(&self) -> Result<EventMetadata, TrackerError> {
        loop {
            if let Some(meta) = self.route.hub_timeout_receipt(self.commitment).await? {
                return Ok(meta);
            }
            debug!(commitment = %self.commitment, "Waiting for hub timeout record");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn await_hub_finalized(&self, record: &EventMetadata) -> Result<u64, TrackerError> {
        loop {
            let height = self.route.hub_height_on_origin().await?;
            if height >= record.block_number {
                return Ok(height);
            }
            debug!(
                height,
                record = record.block_number,
                "Waiting for origin to verify hub timeout record"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn build_message(&self, hub_height: u64) -> Result<Vec<u8>, TrackerError> {
        let proof = self
            .route
            .hub_non_membership_proof(self.commitment, hub_height)
            .await?;
        encode_timeout_calldata(
            &self.route.origin_config.host_contract_address,
            &self.route.hub_config.state_machine_id,
            &self.request,
            hub_height,
            proof,
        )
    }

    async fn step(&self, stage: Stage) -> Option<(TimeoutStatus, Stage)> {
        let outcome = match stage {
            Stage::Done => return None,
            Stage::Failed(description) => {
                return Some((TimeoutStatus::Error { description }, Stage::Done));
            }
            Stage::Start => {
                let next = if self.request.timeout_timestamp == 0 {
                    Stage::Failed("request never times out".to_string())
                } else {
                    Stage::DestinationFinalized
                };
                return Some((TimeoutStatus::Pending, next));
            }
            Stage::DestinationFinalized => {
                self.await_destination_finalized()
                    .await
                    .map(|found| match found {
                        Ok(height) => (
                            TimeoutStatus::DestinationFinalized {
                                meta: EventMetadata::at_height(height),
                            },
                            Stage::HyperbridgeTimedout,
                        ),
                        Err(description) => (TimeoutStatus::Error { description }, Stage::Done),
                    })
            }
            Stage::HyperbridgeTimedout => self.await_hub_timeout().await.map(|record| {
                (
                    TimeoutStatus::HyperbridgeTimedout {
                        meta: record.clone(),
                    },
                    Stage::HyperbridgeFinalized { record },
                )
            }),
            Stage::HyperbridgeFinalized { record } => {
                self.await_hub_finalized(&record).await.map(|hub_height| {
                    (
                        TimeoutStatus::HyperbridgeFinalized {
                            meta: EventMetadata::at_height(hub_height),
                        },
                        Stage::TimeoutMessage { hub_height },
                    )
                })
            }
            Stage::TimeoutMessage { hub_height } => self
                .build_message(hub_height)
                .await
                .map(|calldata| (TimeoutStatus::TimeoutMessage { calldata }, Stage::Done)),
        };

        Some(match outcome {
            Ok((status, next)) => {
                info!(commitment = %self.commitment, status = %status, "Timeout progressed");
                (status, next)
            }
            Err(e) => (
                TimeoutStatus::Error {
                    description: e.to_string(),
                },
                Stage::Done,
            ),
        })
    }
}

/// Lazy sequence of timeout milestones for `request`
///
/// Always starts with `Pending`. Ends after `TimeoutMessage` or `Error`.
pub fn timeout_stream(
    route: Route,
    request: PostRequest,
    poll_interval: Duration,
) -> impl Stream<Item = TimeoutStatus> + Send + 'static {
    let tracker = TimeoutTracker {
        commitment: request.commitment(),
        route,
        request,
        poll_interval,
    };

    stream::unfold((tracker, Stage::Start), |(tracker, stage)| async move {
        let (status, next) = tracker.step(stage).await?;
        Some((status, (tracker, next)))
    })
}
