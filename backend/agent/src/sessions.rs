use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::state::AgentState;

pub type SharedState = Arc<Mutex<AgentState>>;

pub const DEFAULT_MAX_SESSIONS: usize = 256;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

struct Entry {
    state: SharedState,
    last_used: Instant,
}

/// Per-session agent state. Each session has its own lock, so turns for
/// different sessions run concurrently while turns within one session
/// are serialized.
///
/// Sessions idle longer than the timeout are dropped, and past
/// `max_sessions` the least recently used one goes. A turn already holding
/// an evicted session's state finishes normally.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Look up `session_id`, creating the session if it is unknown. A
    /// missing id gets a fresh one.
    pub async fn get_or_create(&self, session_id: Option<String>) -> (String, SharedState) {
        let id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);

        let state = match sessions.get_mut(&id) {
            Some(entry) => {
                entry.last_used = now;
                entry.state.clone()
            }
            None => {
                if sessions.len() >= self.max_sessions {
                    evict_least_recent(&mut sessions);
                }
                debug!(session_id = %id, "Session created");
                let state = Arc::new(Mutex::new(AgentState::new(id.clone())));
                sessions.insert(
                    id.clone(),
                    Entry {
                        state: state.clone(),
                        last_used: now,
                    },
                );
                state
            }
        };
        (id, state)
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedState> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);
        sessions.get_mut(session_id).map(|entry| {
            entry.last_used = now;
            entry.state.clone()
        })
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        sessions.retain(|id, entry| {
            let keep = now.duration_since(entry.last_used) <= self.idle_timeout;
            if !keep {
                debug!(session_id = %id, "Idle session evicted");
            }
            keep
        });
    }
}

fn evict_least_recent(sessions: &mut HashMap<String, Entry>) {
    let oldest = sessions
        .iter()
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        sessions.remove(&id);
        debug!(session_id = %id, "Least recently used session evicted");
    }
}
