//! Timeout message calldata
//!
//! Once the source chain has verified the hub block holding a timeout record,
//! anyone may relay `handlePostRequestTimeouts` to the source chain's handler.
//! This module builds that calldata.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};
use std::str::FromStr;

use crate::error::TrackerError;
use crate::types::{state_machine_numeric_id, PostRequest};

sol! {
    interface IHandler {
        struct PostRequest {
            bytes source;
            bytes dest;
            uint64 nonce;
            bytes from;
            bytes to;
            uint64 timeoutTimestamp;
            bytes body;
        }

        struct StateMachineHeight {
            uint256 stateMachineId;
            uint256 height;
        }

        struct PostRequestTimeoutMessage {
            PostRequest[] timeouts;
            StateMachineHeight height;
            bytes[] proof;
        }

        function handlePostRequestTimeouts(address host, PostRequestTimeoutMessage message) external;
    }
}

impl From<&PostRequest> for IHandler::PostRequest {
    fn from(request: &PostRequest) -> Self {
        Self {
            source: Bytes::copy_from_slice(request.source.as_bytes()),
            dest: Bytes::copy_from_slice(request.dest.as_bytes()),
            nonce: request.nonce,
            from: Bytes::copy_from_slice(&request.from),
            to: Bytes::copy_from_slice(&request.to),
            timeoutTimestamp: request.timeout_timestamp,
            body: Bytes::copy_from_slice(&request.body),
        }
    }
}

/// ABI-encode `handlePostRequestTimeouts(host, message)`
///
/// `hub_height` is the hub height the proof was taken at, as verified by the
/// source chain.
pub fn encode_timeout_calldata(
    source_host: &str,
    hub_state_machine: &str,
    request: &PostRequest,
    hub_height: u64,
    proof: Vec<u8>,
) -> Result<Vec<u8>, TrackerError> {
    let host = Address::from_str(source_host).map_err(|e| {
        TrackerError::InvalidConfig(format!("invalid source host address {}: {}", source_host, e))
    })?;
    let hub_id = state_machine_numeric_id(hub_state_machine).ok_or_else(|| {
        TrackerError::InvalidConfig(format!(
            "hub state machine {} has no numeric id",
            hub_state_machine
        ))
    })?;

    let call = IHandler::handlePostRequestTimeoutsCall {
        host,
        message: IHandler::PostRequestTimeoutMessage {
            timeouts: vec![request.into()],
            height: IHandler::StateMachineHeight {
                stateMachineId: U256::from(hub_id),
                height: U256::from(hub_height),
            },
            proof: vec![Bytes::from(proof)],
        },
    };

    Ok(call.abi_encode())
}
