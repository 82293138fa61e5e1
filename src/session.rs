//! Bounded per-session conversation history.
//!
//! Each session keeps at most `max_exchanges` (user, assistant) pairs;
//! older turns are dropped when new ones arrive. Sessions live for the
//! lifetime of the process.
//!
//! Every session sits behind its own `tokio::sync::Mutex`. A query holds
//! the lock from reading history until its turns are appended, so
//! overlapping queries on one session are applied in arrival order while
//! different sessions never wait on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Turn history of one session.
#[derive(Debug, Default)]
pub struct History {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl History {
    fn new(max_exchanges: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_exchanges * 2,
        }
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push_back(Turn {
            role,
            text: text.into(),
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Retained turns, oldest first.
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Exclusive access to one session for the duration of a query.
pub type SessionGuard = OwnedMutexGuard<History>;

/// In-process session store.
pub struct SessionStore {
    max_exchanges: usize,
    sessions: RwLock<HashMap<String, Arc<Mutex<History>>>>,
}

impl SessionStore {
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            max_exchanges,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_exchanges(&self) -> usize {
        self.max_exchanges
    }

    /// Create an empty session and return its id.
    pub fn create(&self) -> String {
        let (id, _) = self.insert_new();
        id
    }

    fn insert_new(&self) -> (String, Arc<Mutex<History>>) {
        let id = Uuid::new_v4().to_string();
        let slot = Arc::new(Mutex::new(History::new(self.max_exchanges)));
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), slot.clone());
        (id, slot)
    }

    /// Lock the requested session, or a freshly created one if `id` is
    /// `None` or unknown. Returns the id actually locked.
    pub async fn open(&self, id: Option<&str>) -> (String, SessionGuard) {
        if let Some(id) = id {
            if let Some(guard) = self.lock(id).await {
                return (id.to_string(), guard);
            }
        }
        let (id, slot) = self.insert_new();
        (id, slot.lock_owned().await)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    fn slot(&self, id: &str) -> Option<Arc<Mutex<History>>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Lock a session, waiting for any in-flight query on it to finish.
    /// Returns `None` for unknown ids.
    pub async fn lock(&self, id: &str) -> Option<SessionGuard> {
        let slot = self.slot(id)?;
        Some(slot.lock_owned().await)
    }

    /// Append one turn. Returns `false` for unknown ids.
    pub async fn append(&self, id: &str, role: Role, text: &str) -> bool {
        match self.lock(id).await {
            Some(mut history) => {
                history.push(role, text);
                true
            }
            None => false,
        }
    }

    /// The retained turns of a session, oldest first. Empty for unknown ids.
    pub async fn get_history(&self, id: &str) -> Vec<Turn> {
        match self.lock(id).await {
            Some(history) => history.turns(),
            None => Vec::new(),
        }
    }

    /// Drop a session's history. The id stays valid. Returns `false` for
    /// unknown ids.
    pub async fn clear(&self, id: &str) -> bool {
        match self.lock(id).await {
            Some(mut history) => {
                history.clear();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
