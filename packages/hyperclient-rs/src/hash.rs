//! Commitment computation for cross-chain messages
//!
//! Hosts on every chain compute the same keccak-256 over the same packed
//! encoding, so the functions here must stay byte-for-byte compatible.
//!
//! ## Layout
//!
//! ```text
//! request  = source || dest || nonce (u64 BE) || timeout (u64 BE) || from || to || body
//! response = request || response || response_timeout (u64 BE)
//! ```
//!
//! Variable-length fields are concatenated without length prefixes.

use tiny_keccak::{Hasher, Keccak};

use crate::types::Commitment;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Packed encoding of the request fields, in commitment order
pub fn encode_request(
    source: &str,
    dest: &str,
    nonce: u64,
    timeout_timestamp: u64,
    from: &[u8],
    to: &[u8],
    body: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(
        source.len() + dest.len() + 16 + from.len() + to.len() + body.len(),
    );
    data.extend_from_slice(source.as_bytes());
    data.extend_from_slice(dest.as_bytes());
    data.extend_from_slice(&nonce.to_be_bytes());
    data.extend_from_slice(&timeout_timestamp.to_be_bytes());
    data.extend_from_slice(from);
    data.extend_from_slice(to);
    data.extend_from_slice(body);
    data
}

/// Compute the commitment of a post request
pub fn compute_request_commitment(
    source: &str,
    dest: &str,
    nonce: u64,
    timeout_timestamp: u64,
    from: &[u8],
    to: &[u8],
    body: &[u8],
) -> Commitment {
    let data = encode_request(source, dest, nonce, timeout_timestamp, from, to, body);
    Commitment(keccak256(&data))
}

/// Compute the commitment of a post response
///
/// The request encoding is followed by the response payload and its timeout.
#[allow(clippy::too_many_arguments)]
pub fn compute_response_commitment(
    source: &str,
    dest: &str,
    nonce: u64,
    timeout_timestamp: u64,
    from: &[u8],
    to: &[u8],
    body: &[u8],
    response: &[u8],
    response_timeout_timestamp: u64,
) -> Commitment {
    let mut data = encode_request(source, dest, nonce, timeout_timestamp, from, to, body);
    data.extend_from_slice(response);
    data.extend_from_slice(&response_timeout_timestamp.to_be_bytes());
    Commitment(keccak256(&data))
}
