//! A from-scratch Raft consensus peer: a replicated-log coordination library
//! that lets a fixed group of processes agree on a totally ordered sequence
//! of client commands despite crashes, restarts, and network trouble,
//! provided a strict majority stays mutually reachable.
//!
//! The transport (the peer-array capability, [`rpc::RaftClient`]), the
//! persistence device ([`persister::Persister`]), and the host state machine
//! (the [`apply::ApplyMsg`] channel) are all external collaborators this
//! crate only names the interface for -- wiring a real network, disk, or
//! key/value service on top is the host's job.

pub mod apply;
pub mod codec;
pub mod config;
mod election;
mod events;
pub mod log_store;
mod peer;
pub mod persister;
mod replication;
mod role_loop;
pub mod rpc;
mod snapshot;
pub mod state;

pub use apply::ApplyMsg;
pub use config::RaftConfig;
pub use log_store::LogEntry;
pub use peer::{make, Raft};
pub use rpc::{
    AppendEntriesArgs, AppendEntriesReply, InstallSnapshotArgs, InstallSnapshotReply, RaftClient, RequestVoteArgs,
    RequestVoteReply,
};
pub use state::Role;

/// The bound every log entry / host command must satisfy: cheap to clone
/// (the log keeps its own copies, and the apply pipeline hands one to the
/// host per committed index), and serializable so the persistence codec can
/// round-trip it through the raft-state blob.
pub trait Command: Clone + Send + Sync + std::fmt::Debug + serde::Serialize + serde::de::DeserializeOwned + 'static {}

impl<T> Command for T where
    T: Clone + Send + Sync + std::fmt::Debug + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}
