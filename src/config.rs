use std::time::Duration;

/// Timer and channel-capacity knobs for a peer. Plain data the host
/// constructs however it likes; no file/CLI parsing lives in the core
/// (out of scope per the spec).
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Lower bound of the randomized election timeout.
    pub election_timeout_min: Duration,
    /// Upper bound of the randomized election timeout.
    pub election_timeout_max: Duration,
    /// Leader heartbeat / broadcast period. Must be well under
    /// `election_timeout_min` or followers will spuriously start elections.
    pub heartbeat_interval: Duration,
    /// Capacity of the apply channel the host reads from. Not part of the
    /// protocol; only affects how much backpressure the apply pipeline can
    /// absorb before it blocks.
    pub apply_channel_capacity: usize,
    /// Used only in log lines, never in the protocol.
    pub node_label: Option<String>,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            election_timeout_min: Duration::from_millis(550),
            election_timeout_max: Duration::from_millis(883),
            heartbeat_interval: Duration::from_millis(50),
            apply_channel_capacity: 256,
            node_label: None,
        }
    }
}
