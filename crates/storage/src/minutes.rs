//! Meeting minutes stored as one text file per meeting

use crate::database::MeetingId;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MinutesError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of `meeting_<id>.txt` files
#[derive(Debug, Clone)]
pub struct MinutesStore {
    dir: PathBuf,
}

impl MinutesStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, MinutesError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, meeting_id: MeetingId) -> PathBuf {
        self.dir.join(format!("meeting_{meeting_id}.txt"))
    }

    /// Replace the minutes of a meeting
    pub fn put(&self, meeting_id: MeetingId, content: &str) -> Result<(), MinutesError> {
        let path = self.path(meeting_id);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Saved minutes for meeting {} ({} bytes)", meeting_id, content.len());
        Ok(())
    }

    pub fn get(&self, meeting_id: MeetingId) -> Result<Option<String>, MinutesError> {
        match std::fs::read_to_string(self.path(meeting_id)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, meeting_id: MeetingId) -> bool {
        self.path(meeting_id).is_file()
    }
}
