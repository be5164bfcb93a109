//! File-backed persistence for diagrams: one JSON document per diagram.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use heph_core::model::Diagram;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid diagram ID")]
    InvalidId,
    #[error("diagram not found: {id}")]
    NotFound { id: String },
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Stores diagrams as individual JSON files in one directory.
pub struct FileStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Opens (and creates, if needed) the storage directory.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: RwLock::new(()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read_diagram(&self, id: &str) -> Result<Diagram, StoreError> {
        let raw = fs::read(self.path_for(id)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_string() },
            _ => StoreError::Io(e),
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn write_diagram(&self, diagram: &Diagram) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(diagram)?;

        // Write to a temp file in the same directory, then rename into
        // place so a crash mid-write never leaves a partial document.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(self.path_for(&diagram.id))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    /// Persists a new diagram under a generated id and returns the stored
    /// copy.
    pub fn create(&self, diagram: &Diagram) -> Result<Diagram, StoreError> {
        let _guard = self.lock.write();

        let mut stored = diagram.clone();
        stored.id = Uuid::new_v4().to_string();
        self.write_diagram(&stored)?;
        Ok(stored)
    }

    pub fn get(&self, id: &str) -> Result<Diagram, StoreError> {
        validate_id(id)?;
        let _guard = self.lock.read();
        self.read_diagram(id)
    }

    /// Replaces an existing diagram. The stored id wins over whatever the
    /// body carries.
    pub fn update(&self, id: &str, diagram: &Diagram) -> Result<Diagram, StoreError> {
        validate_id(id)?;
        let _guard = self.lock.write();

        self.read_diagram(id)?;

        let mut stored = diagram.clone();
        stored.id = id.to_string();
        self.write_diagram(&stored)?;
        Ok(stored)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        validate_id(id)?;
        let _guard = self.lock.write();

        fs::remove_file(self.path_for(id)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_string() },
            _ => StoreError::Io(e),
        })
    }

    /// All stored diagrams, in unspecified order. Unreadable files are
    /// skipped.
    pub fn list(&self) -> Result<Vec<Diagram>, StoreError> {
        let _guard = self.lock.read();

        let mut diagrams = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(raw) = fs::read(&path) {
                if let Ok(diagram) = serde_json::from_slice::<Diagram>(&raw) {
                    diagrams.push(diagram);
                }
            }
        }
        Ok(diagrams)
    }
}

/// Rejects ids that could escape the storage directory.
fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StoreError::InvalidId);
    }
    Ok(())
}
