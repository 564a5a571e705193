//! In-memory chain and indexer doubles
//!
//! [`MockChain`] implements [`ChainReader`] over state a test scripts through
//! setters, and can inject transient or permanent read failures. Enabled for
//! the crate's own tests and, behind the `testing` feature, for dependents.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::chain::ChainReader;
use crate::error::ChainError;
use crate::indexer::{EventHistory, LifecycleEvent};
use crate::types::{Commitment, EventMetadata};

#[derive(Debug, Default)]
struct MockState {
    latest_height: u64,
    timestamp: u64,
    request_receipts: HashMap<Commitment, EventMetadata>,
    response_receipts: HashMap<Commitment, EventMetadata>,
    timeout_receipts: HashMap<Commitment, EventMetadata>,
    state_machine_heights: HashMap<String, u64>,
    state_machine_timestamps: HashMap<(String, u64), u64>,
    proof: Option<Vec<u8>>,
    transient_failures: u32,
    permanent_failure: Option<String>,
    reads: u64,
}

/// Scriptable [`ChainReader`]
#[derive(Debug)]
pub struct MockChain {
    state_machine: String,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(state_machine: impl Into<String>) -> Self {
        Self {
            state_machine: state_machine.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count a read and apply any injected failure
    fn begin_read(&self) -> Result<MutexGuard<'_, MockState>, ChainError> {
        let mut state = self.state();
        state.reads += 1;
        if let Some(reason) = &state.permanent_failure {
            return Err(ChainError::Rpc {
                code: -32000,
                message: reason.clone(),
            });
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ChainError::Transport("connection refused".to_string()));
        }
        Ok(state)
    }

    pub fn set_latest_height(&self, height: u64) {
        self.state().latest_height = height;
    }

    /// Set the chain clock (unix seconds)
    pub fn set_timestamp(&self, timestamp: u64) {
        self.state().timestamp = timestamp;
    }

    pub fn add_request_receipt(&self, commitment: Commitment, meta: EventMetadata) {
        self.state().request_receipts.insert(commitment, meta);
    }

    pub fn add_response_receipt(&self, commitment: Commitment, meta: EventMetadata) {
        self.state().response_receipts.insert(commitment, meta);
    }

    pub fn add_timeout_receipt(&self, commitment: Commitment, meta: EventMetadata) {
        self.state().timeout_receipts.insert(commitment, meta);
    }

    /// Set the latest verified height of another state machine
    pub fn set_state_machine_height(&self, state_machine: &str, height: u64) {
        self.state()
            .state_machine_heights
            .insert(state_machine.to_string(), height);
    }

    /// Set the timestamp of a verified height of another state machine
    pub fn set_state_machine_timestamp(&self, state_machine: &str, height: u64, timestamp: u64) {
        self.state()
            .state_machine_timestamps
            .insert((state_machine.to_string(), height), timestamp);
    }

    /// Serve state proofs; without one, proof queries are unsupported
    pub fn set_proof(&self, proof: Vec<u8>) {
        self.state().proof = Some(proof);
    }

    /// Fail the next `count` reads with a transport error
    pub fn fail_next_reads(&self, count: u32) {
        self.state().transient_failures = count;
    }

    /// Fail every read with an RPC error until cleared with `None`
    pub fn fail_permanently(&self, reason: Option<&str>) {
        self.state().permanent_failure = reason.map(str::to_string);
    }

    /// Number of reads attempted so far, failed ones included
    pub fn reads(&self) -> u64 {
        self.state().reads
    }
}

#[async_trait]
impl ChainReader for MockChain {
    fn state_machine(&self) -> &str {
        &self.state_machine
    }

    async fn latest_height(&self) -> Result<u64, ChainError> {
        Ok(self.begin_read()?.latest_height)
    }

    async fn timestamp(&self) -> Result<u64, ChainError> {
        Ok(self.begin_read()?.timestamp)
    }

    async fn request_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        Ok(self.begin_read()?.request_receipts.get(&commitment).cloned())
    }

    async fn response_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        Ok(self.begin_read()?.response_receipts.get(&commitment).cloned())
    }

    async fn timeout_receipt(
        &self,
        commitment: Commitment,
    ) -> Result<Option<EventMetadata>, ChainError> {
        Ok(self.begin_read()?.timeout_receipts.get(&commitment).cloned())
    }

    async fn state_machine_height(
        &self,
        state_machine: &str,
        _consensus_state_id: &str,
    ) -> Result<u64, ChainError> {
        Ok(self
            .begin_read()?
            .state_machine_heights
            .get(state_machine)
            .copied()
            .unwrap_or_default())
    }

    async fn state_machine_timestamp(
        &self,
        state_machine: &str,
        _consensus_state_id: &str,
        height: u64,
    ) -> Result<u64, ChainError> {
        self.begin_read()?
            .state_machine_timestamps
            .get(&(state_machine.to_string(), height))
            .copied()
            .ok_or_else(|| {
                ChainError::Decode(format!("no commitment for {} at {}", state_machine, height))
            })
    }

    async fn non_membership_proof(
        &self,
        _commitments: Vec<Commitment>,
        _height: u64,
    ) -> Result<Vec<u8>, ChainError> {
        self.begin_read()?
            .proof
            .clone()
            .ok_or_else(|| ChainError::Unsupported("no proof scripted".to_string()))
    }
}

/// Scriptable [`EventHistory`]
#[derive(Debug, Default)]
pub struct MockHistory {
    events: Mutex<Vec<LifecycleEvent>>,
    failing: Mutex<bool>,
}

impl MockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Make every query fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }
}

#[async_trait]
impl EventHistory for MockHistory {
    async fn get_event_history(
        &self,
        _commitment: Commitment,
    ) -> Result<Vec<LifecycleEvent>, ChainError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(ChainError::Transport("indexer unavailable".to_string()));
        }
        Ok(self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
