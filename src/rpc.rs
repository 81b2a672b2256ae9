//! The peer-array capability consumed by the core: a synchronous-looking
//! "call(method, args) -> (reply, delivered?)" operation with unreliable
//! semantics, per the transport's real-world behavior (drops, delays,
//! duplicates). The transport itself is out of scope; this module only
//! names the interface the core dials against.

use async_trait::async_trait;

use crate::log_store::LogEntry;

#[derive(Debug, Clone)]
pub struct RequestVoteArgs {
    pub term: u64,
    pub candidate_id: usize,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone)]
pub struct RequestVoteReply {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone)]
pub struct AppendEntriesArgs<C> {
    pub term: u64,
    pub leader_id: usize,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry<C>>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone)]
pub struct AppendEntriesReply {
    pub term: u64,
    pub success: bool,
    pub next_index: u64,
}

#[derive(Debug, Clone)]
pub struct InstallSnapshotArgs {
    pub term: u64,
    pub leader_id: usize,
    pub last_included_index: u64,
    pub last_included_term: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct InstallSnapshotReply {
    pub term: u64,
}

/// A single slot of the peer array: the RPC surface one Raft peer dials
/// against to reach another. A `None` return means the call was not
/// delivered (dropped, timed out, connection refused); the core treats that
/// identically to a slow peer and retries on the next tick.
#[async_trait]
pub trait RaftClient<C>: Send + Sync
where
    C: Send + Sync + 'static,
{
    async fn request_vote(&self, args: RequestVoteArgs) -> Option<RequestVoteReply>;

    async fn append_entries(&self, args: AppendEntriesArgs<C>) -> Option<AppendEntriesReply>;

    async fn install_snapshot(&self, args: InstallSnapshotArgs) -> Option<InstallSnapshotReply>;
}
