//! File-based session store — one JSON-lines file per session.
//!
//! Each line is a JSON-encoded `TranscriptEntry`. Files live at
//! `<dir>/<session_id>.jsonl` (default `~/.toolpilot/sessions/`). A save
//! rewrites the whole file through a temporary file and a rename, so a crash
//! never leaves a half-written transcript behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use toolpilot_core::{
    Session, SessionError, SessionId, SessionStore, SessionSummary, TranscriptEntry,
};
use tracing::{debug, warn};

const EXTENSION: &str = "jsonl";

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the file for a session, rejecting ids that could escape `dir`.
    fn path_for(&self, id: &SessionId) -> Result<PathBuf, SessionError> {
        let raw = id.as_str();
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(SessionError::InvalidId(raw.to_string()));
        }
        Ok(self.dir.join(format!("{raw}.{EXTENSION}")))
    }

    fn decode(id: &SessionId, content: &str) -> Result<Session, SessionError> {
        let entries = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str::<TranscriptEntry>(line).map_err(|e| {
                    SessionError::Corrupted {
                        session_id: id.to_string(),
                        reason: format!("line {}: {e}", n + 1),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Session::restore(id.clone(), entries).map_err(|e| SessionError::Corrupted {
            session_id: id.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(session: &Session) -> Result<String, SessionError> {
        let mut content = String::new();
        for entry in session.entries() {
            let line = serde_json::to_string(entry).map_err(|e| {
                SessionError::Storage(format!("Failed to serialize transcript entry: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }
        Ok(content)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let path = self.path_for(id)?;
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        let session = Self::decode(id, &content)?;
        debug!(session = %id, entries = session.len(), "Session loaded");
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.path_for(&session.id)?;
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            SessionError::Storage(format!("Failed to create session directory: {e}"))
        })?;

        let content = Self::encode(session)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, content)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to write session file: {e}")))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to replace session file: {e}")))?;

        debug!(session = %session.id, entries = session.len(), "Session saved");
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, SessionError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to delete {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::Storage(e.to_string())),
        };

        let mut summaries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(&SessionId::from(stem)).await {
                Ok(Some(session)) => summaries.push(SessionSummary::from(&session)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
