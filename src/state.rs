use std::collections::HashSet;

use crate::log_store::Log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// The peer's shared mutable record. Exclusively owned by the peer and
/// mutated only under the peer mutex (see [`crate::peer::Raft`]).
pub struct RaftState<C> {
    pub current_term: u64,
    pub voted_for: Option<usize>,
    pub role: Role,
    pub log: Log<C>,

    pub commit_index: u64,
    pub last_applied: u64,

    /// Candidate-only: peers that have granted a vote this term (including self).
    pub votes_received: HashSet<usize>,

    /// Leader-only, re-initialized on every election.
    pub next_index: Vec<u64>,
    pub match_index: Vec<u64>,
}

impl<C: Clone> RaftState<C> {
    pub fn new(peer_count: usize) -> Self {
        RaftState {
            current_term: 0,
            voted_for: None,
            role: Role::Follower,
            log: Log::new(),
            commit_index: 0,
            last_applied: 0,
            votes_received: HashSet::new(),
            next_index: vec![0; peer_count],
            match_index: vec![0; peer_count],
        }
    }

    /// "Candidate log is at least as up-to-date as mine" (§4.3).
    pub fn candidate_is_up_to_date(&self, last_log_term: u64, last_log_index: u64) -> bool {
        let my_last_term = self.log.last_term();
        let my_last_index = self.log.last_index();
        last_log_term > my_last_term || (last_log_term == my_last_term && last_log_index >= my_last_index)
    }

    /// Resets role/vote/term bookkeeping on observing a higher term from any
    /// RPC or reply. Does not persist; callers must persist afterwards.
    pub fn step_down(&mut self, term: u64) {
        self.current_term = term;
        self.role = Role::Follower;
        self.voted_for = None;
        self.votes_received.clear();
    }
}
