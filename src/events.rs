use tokio::sync::Notify;

/// Edge-triggered wakeups for the role loop. Each is a 1-slot signal: the
/// receiver only needs "an event happened since I last checked," never a
/// queue of past events, so `tokio::sync::Notify` (rather than an unbounded
/// mpsc channel) is the right primitive -- it coalesces redundant notifies
/// and can be fired while holding the peer mutex without risking a full
/// buffer or a blocked sender.
#[derive(Default)]
pub struct Events {
    /// A valid AppendEntries/InstallSnapshot was received from the current leader.
    pub heartbeat: Notify,
    /// This peer granted a vote this term.
    pub vote_granted: Notify,
    /// This peer just became leader.
    pub leader_elected: Notify,
    /// commitIndex advanced; the apply pipeline should re-check its range.
    pub commit_advanced: Notify,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }
}
