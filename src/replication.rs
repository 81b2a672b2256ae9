use std::sync::Arc;

use log::{debug, info};

use crate::peer::Raft;
use crate::rpc::{AppendEntriesArgs, AppendEntriesReply, InstallSnapshotArgs};
use crate::state::Role;
use crate::Command;

impl<C: Command> Raft<C> {
    /// AppendEntries RPC handler (receiver side), §4.4.
    pub async fn append_entries(&self, args: AppendEntriesArgs<C>) -> AppendEntriesReply {
        let mut state = self.state.lock().await;

        if args.term < state.current_term {
            return AppendEntriesReply {
                term: state.current_term,
                success: false,
                next_index: state.log.last_index() + 1,
            };
        }

        // Any valid-term AppendEntries resets the election timer, success or not.
        signal_heartbeat(self, &mut state);

        if args.term > state.current_term {
            state.step_down(args.term);
        } else if state.role == Role::Candidate {
            // A same-term AppendEntries from the elected leader demotes a
            // lingering candidate without bumping the term.
            state.role = Role::Follower;
        }

        if args.prev_log_index > state.log.last_index() {
            let reply = AppendEntriesReply {
                term: state.current_term,
                success: false,
                next_index: state.log.last_index() + 1,
            };
            self.persist(&state);
            return reply;
        }

        if args.prev_log_index > state.log.base_index()
            && state.log.term_at(args.prev_log_index) != Some(args.prev_log_term)
        {
            let next_index = state.log.first_index_of_conflicting_term(args.prev_log_index);
            debug!(
                "[{}] AppendEntries conflict at {}: back off to {next_index}",
                self.label(),
                args.prev_log_index
            );
            let reply = AppendEntriesReply { term: state.current_term, success: false, next_index };
            self.persist(&state);
            return reply;
        }

        if args.prev_log_index >= state.log.base_index() {
            state.log.truncate_suffix_from(args.prev_log_index + 1);
            if !args.entries.is_empty() {
                info!(
                    "[{}] appending {} entries after index {}",
                    self.label(),
                    args.entries.len(),
                    args.prev_log_index
                );
                state.log.append(args.entries);
            }
        }

        if args.leader_commit > state.commit_index {
            state.commit_index = std::cmp::min(args.leader_commit, state.log.last_index());
            signal_commit_advanced(self, &mut state);
        }

        let reply =
            AppendEntriesReply { term: state.current_term, success: true, next_index: state.log.last_index() + 1 };
        self.persist(&state);
        reply
    }
}

fn signal_heartbeat<C: Command>(raft: &Raft<C>, _state: &mut crate::state::RaftState<C>) {
    raft.events.heartbeat.notify_one();
}

fn signal_commit_advanced<C: Command>(raft: &Raft<C>, _state: &mut crate::state::RaftState<C>) {
    raft.events.commit_advanced.notify_one();
}

/// The leader broadcast step (§4.4), run once per heartbeat tick and once
/// immediately after winning an election.
pub(crate) async fn broadcast<C: Command>(raft: &Arc<Raft<C>>) {
    let snapshot = {
        let mut state = raft.state.lock().await;
        if state.role != Role::Leader {
            return;
        }

        advance_commit_index(raft, &mut state);

        let current_term = state.current_term;
        let leader_commit = state.commit_index;
        let base_index = state.log.base_index();
        let base_term = state.log.base_term();

        let mut per_peer = Vec::with_capacity(raft.peer_count());
        for i in 0..raft.peer_count() {
            if i == raft.me {
                continue;
            }
            let next_index = state.next_index[i];
            if next_index > base_index {
                let prev_log_index = next_index - 1;
                let prev_log_term = state.log.term_at(prev_log_index).unwrap_or(base_term);
                let entries = state.log.entries_after(prev_log_index);
                per_peer.push(PeerWork::Append {
                    peer: i,
                    args: AppendEntriesArgs {
                        term: current_term,
                        leader_id: raft.me,
                        prev_log_index,
                        prev_log_term,
                        entries,
                        leader_commit,
                    },
                });
            } else {
                per_peer.push(PeerWork::Snapshot {
                    peer: i,
                    args: InstallSnapshotArgs {
                        term: current_term,
                        leader_id: raft.me,
                        last_included_index: base_index,
                        last_included_term: base_term,
                        data: raft.persister.snapshot(),
                    },
                });
            }
        }
        per_peer
    };

    for work in snapshot {
        match work {
            PeerWork::Append { peer, args } => {
                let raft = Arc::clone(raft);
                let client = Arc::clone(&raft.peers[peer]);
                tokio::spawn(async move {
                    let sent_term = args.term;
                    let prev_log_index = args.prev_log_index;
                    let entries_len = args.entries.len() as u64;
                    if let Some(reply) = client.append_entries(args).await {
                        handle_append_entries_reply(&raft, peer, sent_term, prev_log_index, entries_len, reply).await;
                    }
                });
            }
            PeerWork::Snapshot { peer, args } => {
                let raft = Arc::clone(raft);
                let client = Arc::clone(&raft.peers[peer]);
                tokio::spawn(async move {
                    crate::snapshot::send_install_snapshot(&raft, peer, client, args).await;
                });
            }
        }
    }
}

enum PeerWork<C> {
    Append { peer: usize, args: AppendEntriesArgs<C> },
    Snapshot { peer: usize, args: InstallSnapshotArgs },
}

/// Step 1 of the leader broadcast loop: advance commitIndex over any index a
/// majority has matched at the current term (§5.4.2 guard).
fn advance_commit_index<C: Command>(raft: &Raft<C>, state: &mut crate::state::RaftState<C>) {
    let cluster_size = raft.peer_count();
    let last_index = state.log.last_index();
    let current_term = state.current_term;

    let mut n = state.commit_index;
    for candidate in (state.commit_index + 1)..=last_index {
        if state.log.term_at(candidate) != Some(current_term) {
            continue;
        }
        let matched = state.match_index.iter().filter(|&&m| m >= candidate).count();
        if matched > cluster_size / 2 {
            n = candidate;
        }
    }

    if n > state.commit_index {
        state.commit_index = n;
        info!("[{}] leader advanced commit_index to {n}", raft.label());
        signal_commit_advanced(raft, state);
    }
}

/// AppendEntries reply handling (leader side), §4.4.
async fn handle_append_entries_reply<C: Command>(
    raft: &Arc<Raft<C>>,
    peer: usize,
    sent_term: u64,
    prev_log_index: u64,
    entries_len: u64,
    reply: AppendEntriesReply,
) {
    let mut state = raft.state.lock().await;

    if state.role != Role::Leader || state.current_term != sent_term {
        return;
    }

    if reply.term > state.current_term {
        state.step_down(reply.term);
        raft.persist(&state);
        info!("[{}] stepping down: saw higher term {} in append reply", raft.label(), reply.term);
        return;
    }

    if reply.success {
        let new_match = prev_log_index + entries_len;
        if new_match > state.match_index[peer] {
            state.match_index[peer] = new_match;
        }
        state.next_index[peer] = state.match_index[peer] + 1;
    } else {
        state.next_index[peer] = reply.next_index.max(1);
    }
}
