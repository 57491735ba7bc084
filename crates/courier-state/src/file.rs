//! Atomic JSON map file.

use courier_core::error::CourierError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A flat JSON object on disk, written atomically.
///
/// `save` writes to `<path>.tmp` then renames into place; the rename is the
/// only non-idempotent step and is atomic on the same filesystem, so a
/// crash mid-write leaves the previous durable state intact.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the map. A missing file is an empty map, not an error.
    pub fn load(&self) -> Result<HashMap<String, String>, CourierError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let map = serde_json::from_str(&content)
            .map_err(|e| CourierError::State(format!("corrupt state file {}: {e}", self.path.display())))?;
        Ok(map)
    }

    /// Persist the map via write-temp-then-rename.
    pub fn save(&self, map: &HashMap<String, String>) -> Result<(), CourierError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
