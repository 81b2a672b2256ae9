use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::election;
use crate::peer::Raft;
use crate::replication;
use crate::state::Role;
use crate::Command;

/// The single-threaded driver (§4.6): reads the current role, waits on the
/// events and timers appropriate to it, and lets `become_leader`/`step_down`
/// (invoked from the RPC handlers and reply processors) do the actual role
/// mutation. This loop only decides *what to wait for next*.
pub(crate) async fn run<C: Command>(raft: Arc<Raft<C>>) {
    loop {
        if raft.killed() {
            return;
        }

        let role = raft.state.lock().await.role;
        match role {
            Role::Follower => run_follower(&raft).await,
            Role::Candidate => run_candidate(&raft).await,
            Role::Leader => run_leader_tick(&raft).await,
        }
    }
}

fn random_election_timeout<C: Command>(raft: &Raft<C>) -> Duration {
    let min = raft.config.election_timeout_min;
    let max = raft.config.election_timeout_max;
    if min >= max {
        return min;
    }
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
}

async fn run_follower<C: Command>(raft: &Arc<Raft<C>>) {
    let timeout = random_election_timeout(raft.as_ref());
    tokio::select! {
        _ = raft.events.heartbeat.notified() => {}
        _ = raft.events.vote_granted.notified() => {}
        _ = tokio::time::sleep(timeout) => {
            let mut state = raft.state.lock().await;
            if state.role == Role::Follower {
                state.role = Role::Candidate;
            }
        }
    }
}

async fn run_candidate<C: Command>(raft: &Arc<Raft<C>>) {
    election::start_election(raft).await;

    let timeout = random_election_timeout(raft.as_ref());
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            // Split vote or unresponsive peers: the loop re-enters this
            // branch and start_election bumps the term again.
        }
        _ = raft.events.heartbeat.notified() => {
            let mut state = raft.state.lock().await;
            if state.role == Role::Candidate {
                state.role = Role::Follower;
            }
        }
        _ = raft.events.leader_elected.notified() => {
            // become_leader() already flipped the role; nothing to do.
        }
    }
}

async fn run_leader_tick<C: Command>(raft: &Arc<Raft<C>>) {
    replication::broadcast(raft).await;
    tokio::time::sleep(raft.config.heartbeat_interval).await;
}
