//! An in-process stand-in for the peer-array transport, used only by this
//! crate's own integration tests. Calls are dispatched by direct async
//! function call rather than over a socket, but partitions and drops are
//! modeled explicitly so the scenarios below actually exercise the protocol's
//! unreliable-network assumptions.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tiny_raft::{
    make, AppendEntriesArgs, AppendEntriesReply, ApplyMsg, InstallSnapshotArgs, InstallSnapshotReply, Raft,
    RaftClient, RaftConfig, RequestVoteArgs, RequestVoteReply,
};
use tokio::sync::mpsc;

pub type Cmd = String;

/// Connectivity matrix plus a registry of the live peers, shared by every
/// [`InMemoryClient`] in a cluster.
pub struct Network {
    nodes: RwLock<Vec<Option<Arc<Raft<Cmd>>>>>,
    connected: Mutex<Vec<Vec<bool>>>,
}

impl Network {
    pub fn new(n: usize) -> Arc<Self> {
        Arc::new(Network { nodes: RwLock::new(vec![None; n]), connected: Mutex::new(vec![vec![true; n]; n]) })
    }

    pub fn register(&self, i: usize, node: Arc<Raft<Cmd>>) {
        self.nodes.write().unwrap()[i] = Some(node);
    }

    fn is_connected(&self, from: usize, to: usize) -> bool {
        let c = self.connected.lock().unwrap();
        c[from][to] && c[to][from]
    }

    fn target(&self, to: usize) -> Option<Arc<Raft<Cmd>>> {
        self.nodes.read().unwrap()[to].clone()
    }

    /// Isolates node `i` from every other node, in both directions.
    pub fn disconnect(&self, i: usize) {
        let mut c = self.connected.lock().unwrap();
        let n = c.len();
        for j in 0..n {
            c[i][j] = false;
            c[j][i] = false;
        }
    }

    pub fn reconnect(&self, i: usize) {
        let mut c = self.connected.lock().unwrap();
        let n = c.len();
        for j in 0..n {
            c[i][j] = true;
            c[j][i] = true;
        }
    }
}

pub struct InMemoryClient {
    to: usize,
    from: usize,
    network: Arc<Network>,
}

#[async_trait]
impl RaftClient<Cmd> for InMemoryClient {
    async fn request_vote(&self, args: RequestVoteArgs) -> Option<RequestVoteReply> {
        if !self.network.is_connected(self.from, self.to) {
            return None;
        }
        let target = self.network.target(self.to)?;
        Some(target.request_vote(args).await)
    }

    async fn append_entries(&self, args: AppendEntriesArgs<Cmd>) -> Option<AppendEntriesReply> {
        if !self.network.is_connected(self.from, self.to) {
            return None;
        }
        let target = self.network.target(self.to)?;
        Some(target.append_entries(args).await)
    }

    async fn install_snapshot(&self, args: InstallSnapshotArgs) -> Option<InstallSnapshotReply> {
        if !self.network.is_connected(self.from, self.to) {
            return None;
        }
        let target = self.network.target(self.to)?;
        Some(target.install_snapshot(args).await)
    }
}

/// Short timers so election/commit scenarios converge in well under a second.
pub fn fast_config(label: usize) -> RaftConfig {
    RaftConfig {
        election_timeout_min: Duration::from_millis(150),
        election_timeout_max: Duration::from_millis(300),
        heartbeat_interval: Duration::from_millis(30),
        apply_channel_capacity: 64,
        node_label: Some(label.to_string()),
    }
}

pub struct Cluster {
    pub network: Arc<Network>,
    pub nodes: Vec<Arc<Raft<Cmd>>>,
    pub persisters: Vec<Arc<tiny_raft::persister::MemoryPersister>>,
    pub applied: Vec<Arc<Mutex<Vec<ApplyMsg<Cmd>>>>>,
}

impl Cluster {
    pub fn new(n: usize) -> Self {
        // Each integration test file is its own binary, so this runs once
        // per binary; `try_init` rather than `init` since a later call (e.g.
        // a second #[tokio::test] in the same file) must not panic.
        let _ = env_logger::builder().is_test(true).try_init();

        let network = Network::new(n);
        let mut nodes = Vec::with_capacity(n);
        let mut persisters = Vec::with_capacity(n);
        let mut applied = Vec::with_capacity(n);

        for i in 0..n {
            let peers: Vec<Arc<dyn RaftClient<Cmd>>> = (0..n)
                .map(|j| Arc::new(InMemoryClient { from: i, to: j, network: Arc::clone(&network) }) as Arc<dyn RaftClient<Cmd>>)
                .collect();
            let persister = Arc::new(tiny_raft::persister::MemoryPersister::new());
            let (apply_tx, apply_rx) = mpsc::channel(64);
            let node = make(peers, i, Arc::clone(&persister) as Arc<dyn tiny_raft::persister::Persister>, apply_tx, fast_config(i));
            network.register(i, Arc::clone(&node));

            let log = Arc::new(Mutex::new(Vec::new()));
            spawn_collector(apply_rx, Arc::clone(&log));

            nodes.push(node);
            persisters.push(persister);
            applied.push(log);
        }

        Cluster { network, nodes, persisters, applied }
    }

    /// Rebuilds node `i` from its existing persister, as if it had crashed
    /// and restarted. The old node is dropped (killed) and a fresh one takes
    /// its slot in the network registry.
    pub fn restart(&mut self, i: usize) {
        self.nodes[i].kill();
        let n = self.nodes.len();
        let peers: Vec<Arc<dyn RaftClient<Cmd>>> = (0..n)
            .map(|j| Arc::new(InMemoryClient { from: i, to: j, network: Arc::clone(&self.network) }) as Arc<dyn RaftClient<Cmd>>)
            .collect();
        let (apply_tx, apply_rx) = mpsc::channel(64);
        let node = make(peers, i, Arc::clone(&self.persisters[i]) as Arc<dyn tiny_raft::persister::Persister>, apply_tx, fast_config(i));
        self.network.register(i, Arc::clone(&node));

        let log = Arc::new(Mutex::new(Vec::new()));
        spawn_collector(apply_rx, Arc::clone(&log));

        self.nodes[i] = node;
        self.applied[i] = log;
    }

    pub fn disconnect(&self, i: usize) {
        self.network.disconnect(i);
    }

    pub fn reconnect(&self, i: usize) {
        self.network.reconnect(i);
    }

    pub async fn leaders(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let (_, is_leader) = node.get_state().await;
            if is_leader {
                out.push(i);
            }
        }
        out
    }

    /// Polls until exactly one node reports itself leader, or the deadline
    /// passes. Returns that node's index.
    pub async fn wait_for_one_leader(&self, deadline: Duration) -> Option<usize> {
        let start = tokio::time::Instant::now();
        loop {
            let leaders = self.leaders().await;
            if leaders.len() == 1 {
                return Some(leaders[0]);
            }
            if start.elapsed() > deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until every reachable node has applied at least `count` commands.
    pub async fn wait_for_applied_count(&self, alive: &[usize], count: usize, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            let all_there = alive.iter().all(|&i| self.applied[i].lock().unwrap().len() >= count);
            if all_there {
                return true;
            }
            if start.elapsed() > deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn applied_commands(&self, i: usize) -> Vec<Cmd> {
        self.applied[i]
            .lock()
            .unwrap()
            .iter()
            .filter_map(|msg| match msg {
                ApplyMsg::Command { command, .. } => Some(command.clone()),
                ApplyMsg::Snapshot { .. } => None,
            })
            .collect()
    }
}

fn spawn_collector(mut rx: mpsc::Receiver<ApplyMsg<Cmd>>, log: Arc<Mutex<Vec<ApplyMsg<Cmd>>>>) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            log.lock().unwrap().push(msg);
        }
    });
}
