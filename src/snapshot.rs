use std::sync::Arc;

use log::info;

use crate::peer::Raft;
use crate::rpc::{InstallSnapshotArgs, InstallSnapshotReply, RaftClient};
use crate::state::Role;
use crate::Command;

impl<C: Command> Raft<C> {
    /// `StartSnapshot(bytes, index)`: host-initiated snapshot, §4.5. No-op
    /// if `index` is already covered by a snapshot or isn't committed yet.
    pub async fn start_snapshot(&self, data: Vec<u8>, index: u64) {
        let mut state = self.state.lock().await;

        if index <= state.log.base_index() || index > state.log.last_index() {
            return;
        }

        let last_term = match state.log.term_at(index) {
            Some(t) => t,
            None => return,
        };

        state.log.truncate_prefix_through(index, last_term);
        self.persist(&state);

        let bytes = crate::codec::encode_snapshot(index, last_term, &data);
        if let Err(e) = self.persister.save_snapshot(bytes) {
            log::error!("[{}] failed to persist snapshot through index {index}: {e}", self.label());
            return;
        }
        info!("[{}] snapshotted through index {index} (term {last_term})", self.label());
    }

    /// InstallSnapshot RPC handler (receiver side), §4.5.
    pub async fn install_snapshot(&self, args: InstallSnapshotArgs) -> InstallSnapshotReply {
        let mut state = self.state.lock().await;

        if args.term < state.current_term {
            return InstallSnapshotReply { term: state.current_term };
        }

        self.events.heartbeat.notify_one();

        if args.term > state.current_term {
            state.step_down(args.term);
        }

        if let Err(e) = self.persister.save_snapshot(crate::codec::encode_snapshot(
            args.last_included_index,
            args.last_included_term,
            &args.data,
        )) {
            log::error!("[{}] failed to persist installed snapshot: {e}", self.label());
            return InstallSnapshotReply { term: state.current_term };
        }

        state.log.truncate_prefix_through(args.last_included_index, args.last_included_term);
        state.last_applied = args.last_included_index;
        state.commit_index = args.last_included_index;
        self.persist(&state);

        info!(
            "[{}] installed snapshot through index {} (term {})",
            self.label(),
            args.last_included_index,
            args.last_included_term
        );

        let reply = InstallSnapshotReply { term: state.current_term };
        drop(state);

        // Delivered inline, not through the commit-advance signal: the apply
        // pipeline's lastApplied bookkeeping has already been updated above,
        // so a commit-advance wakeup would find nothing left in (lastApplied,
        // commitIndex] to deliver.
        if self.apply_tx.send(crate::apply::ApplyMsg::Snapshot { data: args.data }).await.is_err() {
            log::info!("[{}] apply channel closed while delivering installed snapshot", self.label());
        }

        reply
    }
}

/// Leader-side InstallSnapshot send + reply handling, dispatched from the
/// broadcast step when a follower's required entry is below the snapshot
/// prefix.
pub(crate) async fn send_install_snapshot<C: Command>(
    raft: &Arc<Raft<C>>,
    peer: usize,
    client: Arc<dyn RaftClient<C>>,
    args: InstallSnapshotArgs,
) {
    let sent_term = args.term;
    let last_included_index = args.last_included_index;

    let reply = match client.install_snapshot(args).await {
        Some(reply) => reply,
        None => return,
    };

    handle_install_snapshot_reply(raft, peer, sent_term, last_included_index, reply).await;
}

async fn handle_install_snapshot_reply<C: Command>(
    raft: &Arc<Raft<C>>,
    peer: usize,
    sent_term: u64,
    last_included_index: u64,
    reply: InstallSnapshotReply,
) {
    let mut state = raft.state.lock().await;

    if state.role != Role::Leader || state.current_term != sent_term {
        return;
    }

    if reply.term > state.current_term {
        state.step_down(reply.term);
        raft.persist(&state);
        info!("[{}] stepping down: saw higher term {} in snapshot reply", raft.label(), reply.term);
        return;
    }

    state.match_index[peer] = last_included_index;
    state.next_index[peer] = last_included_index + 1;
}
