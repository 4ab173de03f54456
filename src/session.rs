//! Durable session store.
//!
//! One JSON file maps session ids to their most recent messages. Every save
//! re-reads the file, replaces one entry and writes the whole mapping back
//! through a temporary file that is renamed over the original, so a crash
//! mid-write leaves the previous file intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::rchain::provider::ChatMessage;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub type SessionMap = BTreeMap<String, Vec<ChatMessage>>;

/// Reads the store at `path`. A missing, unreadable or corrupt file yields
/// an empty mapping; a corrupt entry drops only that session.
pub fn load(path: &Path) -> SessionMap {
    match read_sessions(path) {
        Ok(Some(sessions)) => sessions,
        Ok(None) => SessionMap::new(),
        Err(reason) => {
            warn!(path = %path.display(), %reason, "ignoring unreadable session store");
            SessionMap::new()
        }
    }
}

fn read_sessions(path: &Path) -> Result<Option<SessionMap>, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.to_string()),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let entries: BTreeMap<String, Value> =
        serde_json::from_str(&raw).map_err(|err| err.to_string())?;
    let sessions = entries
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(messages) => Some((id, messages)),
            Err(err) => {
                warn!(session = %id, error = %err, "dropping malformed session");
                None
            }
        })
        .collect();
    Ok(Some(sessions))
}

fn write_sessions(path: &Path, sessions: &SessionMap) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, sessions)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    history_limit: usize,
    sessions: SessionMap,
}

impl SessionStore {
    /// Opens the store, loading whatever is currently on disk.
    pub fn open(path: impl Into<PathBuf>, history_limit: usize) -> Self {
        let path = path.into();
        let sessions = load(&path);
        debug!(path = %path.display(), sessions = sessions.len(), "session store loaded");
        Self {
            path,
            history_limit: history_limit.max(1),
            sessions,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sessions(&self) -> &SessionMap {
        &self.sessions
    }

    /// Stored messages for `id`; empty for an unknown session.
    pub fn transcript(&self, id: &str) -> &[ChatMessage] {
        self.sessions.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Replaces the record for `id` with the last `history_limit` messages
    /// of `messages`.
    pub fn save(&mut self, id: &str, messages: &[ChatMessage]) -> Result<(), ChatError> {
        let start = messages.len().saturating_sub(self.history_limit);
        let record = messages[start..].to_vec();

        self.write_with(|sessions| {
            sessions.insert(id.to_string(), record);
        })?;
        debug!(session = %id, messages = messages.len() - start, "session saved");
        Ok(())
    }

    /// Deletes the record for `id`. Returns whether it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool, ChatError> {
        let mut existed = false;
        self.write_with(|sessions| {
            existed = sessions.remove(id).is_some();
        })?;
        Ok(existed)
    }

    fn write_with(&mut self, update: impl FnOnce(&mut SessionMap)) -> Result<(), ChatError> {
        // Start from the file so sessions written since `open` survive; fall
        // back to memory when the file is gone or corrupt.
        let mut sessions = match read_sessions(&self.path) {
            Ok(Some(on_disk)) => on_disk,
            _ => self.sessions.clone(),
        };
        update(&mut sessions);

        write_sessions(&self.path, &sessions).map_err(|err| ChatError::Persistence {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        self.sessions = sessions;
        Ok(())
    }
}
