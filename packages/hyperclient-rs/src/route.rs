//! Message routing
//!
//! A [`Route`] binds one message leg to the chains it travels over. Requests
//! go from the configured source to the configured destination; responses
//! travel the other way. All reads go through the retry policy.

use std::sync::Arc;

use crate::chain::ChainReader;
use crate::config::ChainConfig;
use crate::error::TrackerError;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{Commitment, EventMetadata};

/// Readers and chain identities for one message leg
#[derive(Clone)]
pub struct Route {
    /// Chain the message leaves from
    pub origin: Arc<dyn ChainReader>,
    /// Chain the message is delivered to
    pub target: Arc<dyn ChainReader>,
    pub hub: Arc<dyn ChainReader>,
    pub origin_config: ChainConfig,
    pub target_config: ChainConfig,
    pub hub_config: ChainConfig,
    pub retry: RetryConfig,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("origin", &self.origin_config.state_machine_id)
            .field("target", &self.target_config.state_machine_id)
            .field("hub", &self.hub_config.state_machine_id)
            .finish()
    }
}

impl Route {
    async fn delivery_receipt(
        &self,
        reader: &dyn ChainReader,
        is_response: bool,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, TrackerError> {
        if is_response {
            with_retry(&self.retry, reader.state_machine(), "response receipt", || {
                reader.response_receipt(commitment)
            })
            .await
        } else {
            with_retry(&self.retry, reader.state_machine(), "request receipt", || {
                reader.request_receipt(commitment)
            })
            .await
        }
    }

    /// Delivery receipt on the target chain
    pub async fn target_receipt(
        &self,
        is_response: bool,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, TrackerError> {
        self.delivery_receipt(self.target.as_ref(), is_response, commitment)
            .await
    }

    /// Delivery receipt on the hub
    pub async fn hub_receipt(
        &self,
        is_response: bool,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, TrackerError> {
        self.delivery_receipt(self.hub.as_ref(), is_response, commitment)
            .await
    }

    /// Current time on the target chain
    pub async fn target_timestamp(&self) -> Result<u64, TrackerError> {
        with_retry(&self.retry, self.target.state_machine(), "timestamp", || {
            self.target.timestamp()
        })
        .await
    }

    /// Latest origin height verified by the hub
    pub async fn origin_height_on_hub(&self) -> Result<u64, TrackerError> {
        let config = &self.origin_config;
        with_retry(&self.retry, self.hub.state_machine(), "origin height", || {
            self.hub
                .state_machine_height(&config.state_machine_id, &config.consensus_state_id)
        })
        .await
    }

    /// Latest target height verified by the hub
    pub async fn target_height_on_hub(&self) -> Result<u64, TrackerError> {
        let config = &self.target_config;
        with_retry(&self.retry, self.hub.state_machine(), "target height", || {
            self.hub
                .state_machine_height(&config.state_machine_id, &config.consensus_state_id)
        })
        .await
    }

    /// Timestamp of a target height verified by the hub
    pub async fn target_timestamp_on_hub(&self, height: u64) -> Result<u64, TrackerError> {
        let config = &self.target_config;
        with_retry(&self.retry, self.hub.state_machine(), "target timestamp", || {
            self.hub.state_machine_timestamp(
                &config.state_machine_id,
                &config.consensus_state_id,
                height,
            )
        })
        .await
    }

    /// Latest hub height verified by the target
    pub async fn hub_height_on_target(&self) -> Result<u64, TrackerError> {
        let config = &self.hub_config;
        with_retry(&self.retry, self.target.state_machine(), "hub height", || {
            self.target
                .state_machine_height(&config.state_machine_id, &config.consensus_state_id)
        })
        .await
    }

    /// Latest hub height verified by the origin
    pub async fn hub_height_on_origin(&self) -> Result<u64, TrackerError> {
        let config = &self.hub_config;
        with_retry(&self.retry, self.origin.state_machine(), "hub height", || {
            self.origin
                .state_machine_height(&config.state_machine_id, &config.consensus_state_id)
        })
        .await
    }

    /// Hub record of a processed request timeout
    pub async fn hub_timeout_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, TrackerError> {
        with_retry(&self.retry, self.hub.state_machine(), "timeout receipt", || {
            self.hub.timeout_receipt(commitment)
        })
        .await
    }

    /// Hub proof that `commitment` has no receipt at `height`
    pub async fn hub_non_membership_proof(
        &self,
        commitment: Commitment,
        height: u64,
    ) -> Result<Vec<u8>, TrackerError> {
        with_retry(&self.retry, self.hub.state_machine(), "state proof", || {
            self.hub.non_membership_proof(vec![commitment], height)
        })
        .await
    }
}
