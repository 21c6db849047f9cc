//! JSON file store.
//!
//! Keeps the whole document in memory, applies each delta to it and
//! rewrites the file atomically (write to a temporary file, then rename).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::info;

use super::{PersistedTopology, TopologyDelta, TopologyStore};
use crate::topology::Result;

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: Mutex<PersistedTopology>,
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields a root-only topology, written on first save.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let data = fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            info!(path = %path.display(), "Channel store not found, starting with root only");
            PersistedTopology::default()
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, document: &PersistedTopology) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let data = serde_json::to_vec_pretty(document)?;
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl TopologyStore for JsonFileStore {
    fn load(&self) -> Result<PersistedTopology> {
        Ok(self.document.lock().clone())
    }

    fn save(&self, delta: &TopologyDelta) -> Result<()> {
        let mut document = self.document.lock();
        let mut next = document.clone();
        next.apply(delta)?;
        self.write(&next)?;
        *document = next;
        Ok(())
    }

    fn replace(&self, topology: &PersistedTopology) -> Result<()> {
        let mut document = self.document.lock();
        self.write(topology)?;
        *document = topology.clone();
        Ok(())
    }
}
