//! In-memory store for tests and ephemeral servers.

use parking_lot::Mutex;

use super::{PersistedTopology, TopologyDelta, TopologyStore};
use crate::topology::Result;

/// Keeps the persisted document in memory and records every delta.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<PersistedTopology>,
    deltas: Mutex<Vec<TopologyDelta>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document.
    #[must_use]
    pub fn with_topology(document: PersistedTopology) -> Self {
        Self {
            document: Mutex::new(document),
            deltas: Mutex::new(Vec::new()),
        }
    }

    /// Deltas saved so far, oldest first.
    pub fn deltas(&self) -> Vec<TopologyDelta> {
        self.deltas.lock().clone()
    }

    /// Current persisted document.
    pub fn document(&self) -> PersistedTopology {
        self.document.lock().clone()
    }
}

impl TopologyStore for MemoryStore {
    fn load(&self) -> Result<PersistedTopology> {
        Ok(self.document())
    }

    fn save(&self, delta: &TopologyDelta) -> Result<()> {
        self.document.lock().apply(delta)?;
        self.deltas.lock().push(delta.clone());
        Ok(())
    }

    fn replace(&self, topology: &PersistedTopology) -> Result<()> {
        *self.document.lock() = topology.clone();
        Ok(())
    }
}
