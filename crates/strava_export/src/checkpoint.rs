//! Single-id checkpoint marking the newest activity already exported.
//!
//! Deleting the file forces the next run to walk the full history.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{ExportError, ExportResult};

pub const DEFAULT_CHECKPOINT_FILE: &str = "last_saved.txt";

#[derive(Clone, Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id recorded by the previous run, or `None` when the file is missing or blank.
    pub fn read(&self) -> ExportResult<Option<i64>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let id = data.trim();
        if id.is_empty() {
            return Ok(None);
        }
        id.parse::<i64>().map(Some).map_err(|e| {
            ExportError::Checkpoint(format!(
                "{} does not hold an activity id ({id:?}): {e}",
                self.path.display()
            ))
        })
    }

    pub fn write(&self, id: i64) -> ExportResult<()> {
        fs::write(&self.path, id.to_string())?;
        tracing::debug!(id, path = %self.path.display(), "checkpoint saved");
        Ok(())
    }
}
