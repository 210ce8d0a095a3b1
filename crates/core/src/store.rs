//! Session store trait: persistence of transcripts between requests.
//!
//! A store is keyed by [`SessionId`] and holds the ordered transcript of each
//! session. It is injected into whoever drives the loop per request; the loop
//! itself never touches it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::session::{Session, SessionId};

/// Listing row for a stored session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub entries: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            entries: session.len(),
            updated_at: session.updated_at,
        }
    }
}

/// The core SessionStore trait.
///
/// Implementations: in-memory (testing, ephemeral servers), JSON-lines files.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The store name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Load a session, or `None` if it has never been saved.
    async fn load(&self, id: &SessionId) -> std::result::Result<Option<Session>, SessionError>;

    /// Persist the full session, replacing any previous copy.
    async fn save(&self, session: &Session) -> std::result::Result<(), SessionError>;

    /// Delete a session. Returns whether it existed.
    async fn delete(&self, id: &SessionId) -> std::result::Result<bool, SessionError>;

    /// List stored sessions, most recently updated first.
    async fn list(&self) -> std::result::Result<Vec<SessionSummary>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EntryContent;

    #[test]
    fn summary_from_session() {
        let mut session = Session::with_id(SessionId::from("abc"));
        session
            .append(EntryContent::User {
                content: "hello".into(),
            })
            .unwrap();
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.id.as_str(), "abc");
        assert_eq!(summary.entries, 1);
    }
}
