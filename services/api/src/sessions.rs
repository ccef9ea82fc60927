//! In-Memory Session Store
//!
//! Every conversation owns its own `DialogueState`. Sessions live only as long
//! as the process; ending a session discards its history.

use chrono::{DateTime, Utc};
use clarify_core::dialogue::DialogueState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A single tutoring conversation.
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Held for the whole of a turn so that turns on one session never interleave.
    pub dialogue: Mutex<DialogueState>,
}

/// The set of live sessions, keyed by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new conversation seeded with `system_prompt`.
    pub async fn create(&self, system_prompt: &str) -> Arc<Session> {
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            dialogue: Mutex::new(DialogueState::new(system_prompt)),
        });
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Ends a session. Returns false if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
