//! hyperclient-rs: Cross-Chain Message Lifecycle Tracking
//!
//! Tracks requests and responses sent between two chains through the
//! hyperbridge hub:
//!
//! - **Status queries** - one-shot lifecycle stage of a message, from
//!   `Pending` through hub delivery and finality to `DestinationDelivered`
//!   or `Timeout`
//! - **Timeout streams** - the steps a timed-out request goes through until
//!   the source chain accepts its timeout, ending in relayable calldata
//! - **Subscriptions** - a non-regressing stream of status changes that races
//!   status polling against the message's timeout
//! - **Commitments** - keccak-256 identifiers matching the on-chain encoding
//!
//! Chains are read through the [`chain::ChainReader`] trait. [`HyperClient::connect`]
//! builds EVM host and hub readers from a [`ClientConfig`];
//! [`HyperClient::with_readers`] accepts any implementation.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! hyperclient-rs = { path = "../hyperclient-rs" }
//! ```
//!
//! ## Feature Flags
//!
//! - `testing` - Enable the in-memory [`testing::MockChain`] for dependents' tests

pub mod calldata;
pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod redact;
pub mod retry;
pub mod route;
pub mod status;
pub mod subscription;
pub mod timeout;
pub mod types;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at the crate root
pub use chain::ChainReader;
pub use client::{HyperClient, TrackerSettings};
pub use config::{ChainConfig, ClientConfig};
pub use error::{ChainError, TrackerError};
pub use hash::{compute_request_commitment, compute_response_commitment, keccak256};
pub use indexer::{EventHistory, IndexerClient, LifecycleEvent, RecordedStatus};
pub use retry::RetryConfig;
pub use subscription::StatusStream;
pub use types::{
    Commitment, EventMetadata, Message, MessageStatus, PostRequest, PostResponse, TimeoutStatus,
};
