use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::apply::{self, ApplyMsg};
use crate::codec;
use crate::config::RaftConfig;
use crate::events::Events;
use crate::log_store::LogEntry;
use crate::persister::Persister;
use crate::role_loop;
use crate::rpc::RaftClient;
use crate::state::{RaftState, Role};
use crate::Command;

/// A live Raft peer. Cheap to clone (it's just the `Arc`); the real state
/// lives behind `self.state`.
pub struct Raft<C: Command> {
    pub(crate) me: usize,
    pub(crate) peers: Vec<Arc<dyn RaftClient<C>>>,
    pub(crate) persister: Arc<dyn Persister>,
    pub(crate) state: Mutex<RaftState<C>>,
    pub(crate) events: Events,
    pub(crate) apply_tx: mpsc::Sender<ApplyMsg<C>>,
    pub(crate) config: RaftConfig,
    killed: AtomicBool,
}

impl<C: Command> Raft<C> {
    pub(crate) fn label(&self) -> String {
        match &self.config.node_label {
            Some(label) => label.clone(),
            None => self.me.to_string(),
        }
    }

    pub(crate) fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub(crate) fn majority(&self) -> usize {
        self.peer_count() / 2 + 1
    }

    /// Persists (currentTerm, votedFor, log) to the raft-state blob. Must be
    /// called with the state lock held, right after any mutation of those
    /// fields and before any externally observable action that depends on
    /// them (granting a vote, acknowledging an append).
    pub(crate) fn persist(&self, state: &MutexGuard<'_, RaftState<C>>) {
        let bytes = codec::encode_raft_state(state.current_term, state.voted_for, &state.log);
        if let Err(e) = self.persister.save_raft_state(bytes) {
            // Per the spec's error-handling design, a persistence failure is
            // fatal: the peer may not acknowledge a state change it cannot
            // durably record, and every caller of persist() is about to do
            // exactly that (grant a vote, ack an append, report a Start
            // index). Continuing would silently violate the durability
            // precondition those acknowledgements rely on.
            log::error!("[{}] fatal: failed to persist raft state: {e}", self.label());
            panic!("raft state persistence failed for peer {}: {e}", self.me);
        }
    }

    /// `GetState() -> (term, isLeader)`.
    pub async fn get_state(&self) -> (u64, bool) {
        let state = self.state.lock().await;
        (state.current_term, state.role == Role::Leader)
    }

    /// `Start(command) -> (index, term, isLeader)`. Leader-only; does not
    /// wait for commit.
    pub async fn start(&self, command: C) -> (i64, u64, bool) {
        let mut state = self.state.lock().await;
        if state.role != Role::Leader {
            return (-1, state.current_term, false);
        }

        let index = state.log.last_index() + 1;
        let term = state.current_term;
        state.log.append(vec![LogEntry { index, term, command: Some(command) }]);
        state.match_index[self.me] = index;
        self.persist(&state);

        info!("[{}] accepted command at index {index} (term {term})", self.label());
        (index as i64, term, true)
    }

    /// `GetRaftStateSize() -> int`, backed by the persister's own view of
    /// the blob so a host's snapshot-trigger heuristic sees the real
    /// on-disk/in-memory figure rather than a recomputation.
    pub fn get_raft_state_size(&self) -> usize {
        self.persister.raft_state_size()
    }

    /// Requests graceful shutdown. Background tasks observe this on their
    /// next wakeup and exit; already-dispatched RPCs are left to finish.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }
}

/// `Make(peers, selfIndex, persister, applyChannel)`. Returns promptly; all
/// long-running work (role loop, apply pipeline) runs as background tasks.
pub fn make<C: Command>(
    peers: Vec<Arc<dyn RaftClient<C>>>,
    me: usize,
    persister: Arc<dyn Persister>,
    apply_tx: mpsc::Sender<ApplyMsg<C>>,
    config: RaftConfig,
) -> Arc<Raft<C>> {
    let mut state = RaftState::new(peers.len());

    // Recovery sequence (§4.2): raft-state first, then snapshot. No
    // re-entrancy -- each blob is decoded exactly once here.
    if let Some(decoded) = codec::decode_raft_state::<C>(&persister.raft_state()) {
        state.current_term = decoded.current_term;
        state.voted_for = decoded.voted_for;
        state.log = decoded.log;
        info!(
            "peer {me}: restored term={} voted_for={:?} log_len={}",
            state.current_term,
            state.voted_for,
            state.log.last_index() - state.log.base_index() + 1
        );
    }

    let mut pending_snapshot = None;
    if let Some(decoded) = codec::decode_snapshot(&persister.snapshot()) {
        state.commit_index = decoded.last_included_index;
        state.last_applied = decoded.last_included_index;
        state
            .log
            .truncate_prefix_through(decoded.last_included_index, decoded.last_included_term);
        info!(
            "peer {me}: restored snapshot through index {}",
            decoded.last_included_index
        );
        pending_snapshot = Some(decoded.data.to_vec());
    }

    let raft = Arc::new(Raft {
        me,
        peers,
        persister,
        state: Mutex::new(state),
        events: Events::new(),
        apply_tx,
        config,
        killed: AtomicBool::new(false),
    });

    if let Some(data) = pending_snapshot {
        let raft_for_snapshot = Arc::clone(&raft);
        tokio::spawn(async move {
            let _ = raft_for_snapshot.apply_tx.send(ApplyMsg::Snapshot { data }).await;
        });
    }

    let role_loop_raft = Arc::clone(&raft);
    tokio::spawn(async move {
        role_loop::run(role_loop_raft).await;
    });

    let apply_raft = Arc::clone(&raft);
    tokio::spawn(async move {
        apply::run(apply_raft).await;
    });

    raft
}
