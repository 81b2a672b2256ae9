//! The persistence-device capability consumed by the core: a place to store
//! two byte blobs (raft-state, snapshot) that survive a crash. The device
//! itself -- a real database, a file, a test double -- is out of scope; this
//! module only names the interface and ships the two implementations the
//! rest of this crate (and its tests) actually need.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::error;

/// Atomically stores the raft-state blob and the snapshot blob. Each `save_*`
/// call is atomic with respect to a crash; the core never assumes atomicity
/// *across* the two blobs (see the persistence codec's recovery sequence).
pub trait Persister: Send + Sync {
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()>;
    fn save_snapshot(&self, snapshot: Vec<u8>) -> Result<()>;
    fn raft_state(&self) -> Vec<u8>;
    fn snapshot(&self) -> Vec<u8>;

    /// Bytes currently used by the raft-state blob, exposed so the host can
    /// decide when to snapshot.
    fn raft_state_size(&self) -> usize {
        self.raft_state().len()
    }
}

/// An in-memory persister, for tests and for hosts that don't need crash
/// recovery (e.g. a throwaway single-process demo cluster).
#[derive(Default)]
pub struct MemoryPersister {
    raft_state: Mutex<Vec<u8>>,
    snapshot: Mutex<Vec<u8>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persister for MemoryPersister {
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        *self.raft_state.lock().unwrap() = state;
        Ok(())
    }

    fn save_snapshot(&self, snapshot: Vec<u8>) -> Result<()> {
        *self.snapshot.lock().unwrap() = snapshot;
        Ok(())
    }

    fn raft_state(&self) -> Vec<u8> {
        self.raft_state.lock().unwrap().clone()
    }

    fn snapshot(&self) -> Vec<u8> {
        self.snapshot.lock().unwrap().clone()
    }
}

/// A file-backed persister: the same bincode-on-disk strategy as the source
/// this core was extracted from, but driven by the codec in [`crate::codec`]
/// instead of ad hoc struct fields, and with a distinct file per blob so a
/// crash mid-write to one never corrupts the other.
pub struct FilePersister {
    raft_state_path: PathBuf,
    snapshot_path: PathBuf,
}

impl FilePersister {
    pub fn new(base_dir: impl Into<PathBuf>, node_id: &str) -> Self {
        let base = base_dir.into();
        FilePersister {
            raft_state_path: base.join(format!("raft_state_{node_id}.bin")),
            snapshot_path: base.join(format!("raft_snapshot_{node_id}.bin")),
        }
    }

    fn read(path: &PathBuf) -> Vec<u8> {
        match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                error!("failed to read persisted blob {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    fn write_atomic(path: &PathBuf, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} into place", path.display()))?;
        Ok(())
    }
}

impl Persister for FilePersister {
    fn save_raft_state(&self, state: Vec<u8>) -> Result<()> {
        Self::write_atomic(&self.raft_state_path, &state)
    }

    fn save_snapshot(&self, snapshot: Vec<u8>) -> Result<()> {
        Self::write_atomic(&self.snapshot_path, &snapshot)
    }

    fn raft_state(&self) -> Vec<u8> {
        Self::read(&self.raft_state_path)
    }

    fn snapshot(&self) -> Vec<u8> {
        Self::read(&self.snapshot_path)
    }
}
