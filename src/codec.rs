//! Encode/decode for the two persisted blobs named in the spec: the
//! raft-state blob (currentTerm, votedFor, log) and the snapshot blob
//! (lastIncludedIndex, lastIncludedTerm, opaque host bytes).

use serde::{Deserialize, Serialize};

use crate::log_store::Log;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRaftState<C> {
    current_term: u64,
    voted_for: Option<usize>,
    log: Log<C>,
}

pub fn encode_raft_state<C: Serialize + Clone>(
    current_term: u64,
    voted_for: Option<usize>,
    log: &Log<C>,
) -> Vec<u8> {
    let persisted = PersistedRaftState { current_term, voted_for, log: log.clone() };
    bincode::serialize(&persisted).expect("raft-state encoding is infallible for owned data")
}

pub struct DecodedRaftState<C> {
    pub current_term: u64,
    pub voted_for: Option<usize>,
    pub log: Log<C>,
}

/// Returns `None` if `bytes` is empty (no prior persisted state) or corrupt.
pub fn decode_raft_state<C: for<'de> Deserialize<'de> + Clone>(
    bytes: &[u8],
) -> Option<DecodedRaftState<C>> {
    if bytes.is_empty() {
        return None;
    }
    match bincode::deserialize::<PersistedRaftState<C>>(bytes) {
        Ok(p) => Some(DecodedRaftState { current_term: p.current_term, voted_for: p.voted_for, log: p.log }),
        Err(e) => {
            log::error!("failed to decode persisted raft state: {e}");
            None
        }
    }
}

/// Snapshot blob layout: a fixed-width (lastIncludedIndex, lastIncludedTerm)
/// header followed by the opaque host bytes, concatenated rather than
/// wrapped in one envelope, so the header can be read back without touching
/// the (possibly large) host payload.
const SNAPSHOT_HEADER_LEN: usize = 16;

pub fn encode_snapshot(last_included_index: u64, last_included_term: u64, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_LEN + data.len());
    out.extend_from_slice(&last_included_index.to_le_bytes());
    out.extend_from_slice(&last_included_term.to_le_bytes());
    out.extend_from_slice(data);
    out
}

pub struct DecodedSnapshot<'a> {
    pub last_included_index: u64,
    pub last_included_term: u64,
    pub data: &'a [u8],
}

/// Returns `None` if `bytes` is empty (no snapshot has ever been taken).
pub fn decode_snapshot(bytes: &[u8]) -> Option<DecodedSnapshot<'_>> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.len() < SNAPSHOT_HEADER_LEN {
        log::error!("snapshot blob shorter than its header, ignoring");
        return None;
    }
    let last_included_index = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let last_included_term = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
    Some(DecodedSnapshot { last_included_index, last_included_term, data: &bytes[SNAPSHOT_HEADER_LEN..] })
}
