use engine::Transcript;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

/// One session's transcript. Holding the lock serialises exchanges of that session.
pub type Conversation = Arc<tokio::sync::Mutex<Transcript>>;

struct Entry {
    conversation: Conversation,
    last_used: Instant,
}

/// Server-side conversation state keyed by the session cookie.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // The map holds no invariants a panicking holder could break.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Session id for a cookie value, minting a new one when absent or malformed.
    /// The flag is true when the id was minted.
    pub fn resolve(&self, cookie: Option<&str>) -> (String, bool) {
        match cookie.and_then(|v| Uuid::parse_str(v.trim()).ok()) {
            Some(id) => (id.to_string(), false),
            None => (Uuid::new_v4().to_string(), true),
        }
    }

    pub fn conversation(&self, session_id: &str) -> Conversation {
        let mut sessions = self.sessions();
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                conversation: Arc::new(tokio::sync::Mutex::new(Transcript::new())),
                last_used: Instant::now(),
            });
        entry.last_used = Instant::now();
        entry.conversation.clone()
    }

    /// Clear a session's transcript, waiting for any exchange in flight.
    pub async fn reset(&self, session_id: &str) {
        let conversation = self.conversation(session_id);
        conversation.lock().await.clear();
    }

    /// Forget sessions untouched for longer than `max_idle`. Returns how many were dropped.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.last_used.elapsed() <= max_idle || Arc::strong_count(&entry.conversation) > 1
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
