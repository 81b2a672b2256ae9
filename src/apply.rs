use std::sync::Arc;

use log::{debug, info};

use crate::peer::Raft;

/// A message delivered to the host in strict index order.
#[derive(Debug, Clone)]
pub enum ApplyMsg<C> {
    /// A committed log entry, ready to be applied to the host state machine.
    Command { index: u64, command: C },
    /// The host should reset its state machine from this opaque snapshot.
    Snapshot { data: Vec<u8> },
}

/// The apply pipeline: waits for commit-advance signals and delivers
/// log[lastApplied+1 ..= commitIndex] to the host in order, one at a time,
/// advancing lastApplied as each message is enqueued. Runs until the peer is
/// killed.
pub(crate) async fn run<C>(raft: Arc<Raft<C>>)
where
    C: crate::Command,
{
    loop {
        if raft.killed() {
            return;
        }

        // Snapshot the window to deliver under the lock, then release it
        // before touching the (possibly blocking) host channel.
        let to_deliver = {
            let mut state = raft.state.lock().await;
            let mut batch = Vec::new();
            while state.last_applied < state.commit_index {
                let next = state.last_applied + 1;
                match state.log.entry_at(next) {
                    Some(entry) => {
                        let command = entry
                            .command
                            .clone()
                            .expect("committed entries past the sentinel always carry a command");
                        batch.push(ApplyMsg::Command { index: next, command });
                        state.last_applied = next;
                    }
                    None => {
                        // The entry was truncated out from under us by a
                        // concurrent snapshot install; lastApplied already
                        // reflects the snapshot's lastIncludedIndex in that
                        // case, so there is nothing left to deliver here.
                        break;
                    }
                }
            }
            batch
        };

        if to_deliver.is_empty() {
            raft.events.commit_advanced.notified().await;
            continue;
        }

        for msg in to_deliver {
            debug!("[{}] delivering {:?}", raft.label(), msg);
            if raft.apply_tx.send(msg).await.is_err() {
                info!("[{}] apply channel closed, stopping apply pipeline", raft.label());
                return;
            }
        }
    }
}
