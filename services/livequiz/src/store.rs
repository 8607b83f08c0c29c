//! Persistence of finished quiz sessions.

use crate::directory::SessionId;
use chrono::{DateTime, Utc};
use hashbrown::HashSet;
use serde_derive::{Deserialize, Serialize};
use std::error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub trait SessionStore {
    /// Marks the session as finished. Repeated calls for the same session are no-ops. Returns
    /// true if the session was not finished before.
    fn mark_finished(&mut self, sid: SessionId) -> Result<bool, StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "session journal I/O error: {}", err),
            StoreError::Json(err) => write!(f, "corrupt session journal entry: {}", err),
        }
    }
}

impl error::Error for StoreError {}

impl From<io::Error> for StoreError {
    #[inline]
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    #[inline]
    fn from(err: serde_json::Error) -> Self {
        StoreError::Json(err)
    }
}

/// Keeps everything in memory. Every call is recorded.
#[derive(Debug, Default)]
pub struct MemoryStore {
    calls: Vec<SessionId>,
    finished: HashSet<SessionId>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Every `mark_finished` call in order, repeats included.
    #[inline]
    pub fn calls(&self) -> &[SessionId] {
        &self.calls
    }

    #[inline]
    pub fn is_finished(&self, sid: SessionId) -> bool {
        self.finished.contains(&sid)
    }
}

impl SessionStore for MemoryStore {
    fn mark_finished(&mut self, sid: SessionId) -> Result<bool, StoreError> {
        self.calls.push(sid);
        Ok(self.finished.insert(sid))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JournalEntry {
    pub sid: SessionId,
    pub status: String,
    pub finished_at: DateTime<Utc>,
}

/// Appends one JSON line per finished session to a journal file.
pub struct JournalStore {
    path: PathBuf,
    file: File,
    finished: HashSet<SessionId>,
}

impl JournalStore {
    pub const STATUS_FINISHED: &'static str = "finished";

    /// Opens (or creates) the journal, picking up the sessions finished by earlier runs.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<JournalStore, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut finished = HashSet::new();

        if path.exists() {
            for line in BufReader::new(File::open(&path)?).lines() {
                let line = line?;

                if line.trim().is_empty() {
                    continue;
                }

                let entry: JournalEntry = serde_json::from_str(&line)?;
                finished.insert(entry.sid);
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(JournalStore { path, file, finished })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn is_finished(&self, sid: SessionId) -> bool {
        self.finished.contains(&sid)
    }
}

impl SessionStore for JournalStore {
    fn mark_finished(&mut self, sid: SessionId) -> Result<bool, StoreError> {
        if self.finished.contains(&sid) {
            return Ok(false);
        }

        let entry = JournalEntry {
            sid,
            status: Self::STATUS_FINISHED.to_string(),
            finished_at: Utc::now(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()?;

        self.finished.insert(sid);
        Ok(true)
    }
}
