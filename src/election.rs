use std::sync::Arc;

use log::{debug, info};

use crate::peer::Raft;
use crate::rpc::{RequestVoteArgs, RequestVoteReply};
use crate::state::Role;
use crate::Command;

impl<C: Command> Raft<C> {
    /// RequestVote RPC handler (receiver side), §4.3.
    pub async fn request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        let mut state = self.state.lock().await;

        if args.term < state.current_term {
            return RequestVoteReply { term: state.current_term, vote_granted: false };
        }

        if args.term > state.current_term {
            state.step_down(args.term);
        }

        let up_to_date = state.candidate_is_up_to_date(args.last_log_term, args.last_log_index);
        let can_vote = state.voted_for.is_none() || state.voted_for == Some(args.candidate_id);

        let vote_granted = if up_to_date && can_vote {
            state.voted_for = Some(args.candidate_id);
            info!("[{}] granted vote to {} for term {}", self.label(), args.candidate_id, args.term);
            true
        } else {
            debug!(
                "[{}] denied vote to {} for term {} (up_to_date={up_to_date}, can_vote={can_vote})",
                self.label(),
                args.candidate_id,
                args.term
            );
            false
        };

        let reply = RequestVoteReply { term: state.current_term, vote_granted };
        self.persist(&state);
        if vote_granted {
            // Dropping the lock before notifying keeps the invariant that we
            // never hold it across anything that isn't a bounded, always-
            // capacity internal signal; Notify satisfies that, but there's
            // no reason to hold the lock a moment longer than needed either.
            drop(state);
            self.events.vote_granted.notify_one();
        }
        reply
    }
}

/// Candidate transition + vote solicitation (§4.3). Called from the role
/// loop on election timeout, and again on each retry.
pub(crate) async fn start_election<C: Command>(raft: &Arc<Raft<C>>) {
    let (term, last_log_index, last_log_term, won_on_self_vote) = {
        let mut state = raft.state.lock().await;
        state.role = Role::Candidate;
        state.current_term += 1;
        state.voted_for = Some(raft.me);
        state.votes_received.clear();
        state.votes_received.insert(raft.me);
        raft.persist(&state);
        info!("[{}] starting election for term {}", raft.label(), state.current_term);

        // A lone peer (or any cluster where self-vote alone is a strict
        // majority) never receives a vote reply to trigger the usual
        // majority check, so it must be promoted right here.
        let won_on_self_vote = state.votes_received.len() >= raft.majority();
        if won_on_self_vote {
            become_leader(raft, &mut state);
        }
        (state.current_term, state.log.last_index(), state.log.last_term(), won_on_self_vote)
    };

    if won_on_self_vote {
        raft.events.leader_elected.notify_one();
        crate::replication::broadcast(raft).await;
        return;
    }

    for (i, peer) in raft.peers.iter().enumerate() {
        if i == raft.me {
            continue;
        }
        let raft = Arc::clone(raft);
        let peer = Arc::clone(peer);
        tokio::spawn(async move {
            let args = RequestVoteArgs { term, candidate_id: raft.me, last_log_index, last_log_term };
            if let Some(reply) = peer.request_vote(args).await {
                handle_vote_reply(&raft, i, term, reply).await;
            }
        });
    }
}

/// Vote-reply handling (requester side), §4.3.
async fn handle_vote_reply<C: Command>(raft: &Arc<Raft<C>>, voter: usize, sent_term: u64, reply: RequestVoteReply) {
    let mut state = raft.state.lock().await;

    // Stale: we've moved on since sending this RequestVote.
    if state.role != Role::Candidate || state.current_term != sent_term {
        return;
    }

    if reply.term > state.current_term {
        state.step_down(reply.term);
        raft.persist(&state);
        info!("[{}] stepping down: saw higher term {} in vote reply", raft.label(), reply.term);
        return;
    }

    if !reply.vote_granted {
        return;
    }

    state.votes_received.insert(voter);
    let have_majority = state.votes_received.len() >= raft.majority();
    debug!(
        "[{}] vote from {voter}: {}/{} for term {sent_term}",
        raft.label(),
        state.votes_received.len(),
        raft.majority()
    );

    if have_majority {
        become_leader(raft, &mut state);
        drop(state);
        raft.events.leader_elected.notify_one();
        crate::replication::broadcast(raft).await;
    }
}

/// Transitions directly to Leader and initializes nextIndex/matchIndex in
/// the same critical section as the role flip, per the spec's fix for the
/// source's become-Follower-then-promote ordering hazard: there is no
/// window where another task can observe a vote-majority Candidate that
/// hasn't yet been promoted.
pub(crate) fn become_leader<C: Command>(raft: &Arc<Raft<C>>, state: &mut crate::state::RaftState<C>) {
    state.role = Role::Leader;
    let next = state.log.last_index() + 1;
    for i in 0..raft.peer_count() {
        state.next_index[i] = next;
        state.match_index[i] = 0;
    }
    state.match_index[raft.me] = state.log.last_index();
    info!("[{}] became leader for term {}", raft.label(), state.current_term);
}
