//! Per-request session handling.
//!
//! Each request loads its session, runs the controller on it, and saves it
//! back. Requests on the same session are serialized by a per-session lock;
//! requests on different sessions run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use toolpilot_agent::{AgentStreamEvent, LoopOutcome, ReactController};
use toolpilot_core::{Session, SessionId, SessionStore, TranscriptEntry};

/// Lazily created per-session async locks.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Nobody else holds these.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// What one request produced.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session_id: SessionId,
    pub outcome: LoopOutcome,
    /// Entries appended by this request, user message first
    pub entries: Vec<TranscriptEntry>,
}

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: SessionLocks::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one user message against a session (a new one if `session_id` is
    /// `None`) and persist the result.
    ///
    /// The session is saved even when the loop fails, so the transcript of a
    /// failed run stays inspectable.
    pub async fn run_turn(
        &self,
        controller: &ReactController,
        session_id: Option<SessionId>,
        message: &str,
        cancel: &CancellationToken,
        events: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> toolpilot_core::Result<TurnReport> {
        let id = session_id.unwrap_or_else(SessionId::new);
        let _guard = self.locks.acquire(&id).await;

        let mut session = self
            .store
            .load(&id)
            .await?
            .unwrap_or_else(|| Session::with_id(id.clone()));
        let before = session.len();
        debug!(session = %id, entries = before, "Session loaded");

        let outcome = match events {
            Some(tx) => {
                controller
                    .run_with_events(&mut session, message, cancel, tx)
                    .await?
            }
            None => controller.run(&mut session, message, cancel).await?,
        };

        self.store.save(&session).await?;

        Ok(TurnReport {
            session_id: id,
            outcome,
            entries: session.entries_since(before).to_vec(),
        })
    }
}
