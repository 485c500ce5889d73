use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::ReviewBotError;
use crate::model::ReviewAggregate;

/// Raw search response.
pub const RESTAURANTS_FILE_NAME: &str = "list_of_restaurants.json";
/// Harvested aggregate.
pub const TRUE_REVIEWS_FILE_NAME: &str = "true_reviews.json";
/// Synthetic aggregate.
pub const NEW_REVIEWS_FILE_NAME: &str = "new_reviews.json";

/// Writes pretty-printed JSON snapshots into one output directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Serialize `value` to `file_name`, creating the directory if needed.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<PathBuf, ReviewBotError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.path_for(file_name);
        let serialized = serde_json::to_string_pretty(value)?;
        let temp_path = build_temp_path(&path);
        fs::write(&temp_path, format!("{serialized}\n"))?;
        fs::rename(&temp_path, &path)?;
        info!(path = %path.display(), "Snapshot written");
        Ok(path)
    }
}

/// Read an aggregate previously written by [`SnapshotWriter::write`].
pub fn load_aggregate(path: &Path) -> Result<ReviewAggregate, ReviewBotError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn build_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => {
            temp_path.set_extension(format!("{ext}.tmp"));
        }
        _ => {
            temp_path.set_extension("tmp");
        }
    }
    temp_path
}
