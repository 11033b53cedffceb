use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Class names in output-index order, stored on disk as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    pub fn new(labels: Vec<String>) -> LabelMap {
        LabelMap { labels }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn from_json(json: &str) -> Result<LabelMap, ModelError> {
        let map: LabelMap = serde_json::from_str(json).map_err(|e| ModelError::LabelMap(e.to_string()))?;
        if map.is_empty() {
            return Err(ModelError::LabelMap("no class names".into()));
        }
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<LabelMap, ModelError> {
        let json = std::fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        LabelMap::from_json(&json)
    }

    /// Writes the label map, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ModelError::io(parent, e))?;
        }
        let json = serde_json::to_string(self).map_err(|e| ModelError::LabelMap(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ModelError::io(path, e))
    }
}
