use std::sync::{Arc, Mutex};

use lru::LruCache;
use protocol::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::{NodeHistory, Observation};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Observations kept per sender.
    pub history_window: usize,
    /// Messages kept per deep-analysis session.
    pub max_sequence_length: usize,
    pub session_ttl_ms: i64,
    /// Senders tracked at once; beyond this the least recently seen idle
    /// sender is dropped.
    pub max_senders: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_window: 100,
            max_sequence_length: 50,
            session_ttl_ms: 600_000,
            max_senders: 10_000,
        }
    }
}

/// Everything the pipeline remembers about one sender.
#[derive(Debug)]
pub struct SenderState {
    pub history: NodeHistory,
    pub session: Option<Session>,
    max_sequence_length: usize,
}

impl SenderState {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            history: NodeHistory::new(config.history_window),
            session: None,
            max_sequence_length: config.max_sequence_length,
        }
    }

    /// Records `message` in the history and in the open session, if any.
    pub fn observe(&mut self, message: &Arc<Message>, now_ms: i64) {
        self.history
            .record(Observation::new(Arc::clone(message), now_ms));
        if let Some(session) = self.session.as_mut() {
            session.append(Arc::clone(message), now_ms);
        }
    }

    /// The sender's session, opened from the current history on first use.
    pub fn session_or_seed(&mut self, now_ms: i64) -> &mut Session {
        let history = &self.history;
        let max = self.max_sequence_length;
        self.session
            .get_or_insert_with(|| Session::seeded(max, history.messages(), now_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    LockPoisoned,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LockPoisoned => write!(f, "sender registry lock poisoned"),
        }
    }
}

impl std::error::Error for RegistryError {}

pub type SenderHandle = Arc<tokio::sync::Mutex<SenderState>>;

/// LRU-bounded map of per-sender state. Each sender has its own async lock so
/// work for one sender is serialized while different senders proceed freely.
///
/// A handle still held outside the registry is never evicted, so a sender
/// cannot end up with two live locks. While every tracked sender is busy the
/// map may exceed `max_senders`; later insertions trim it back.
#[derive(Debug)]
pub struct SenderRegistry {
    config: HistoryConfig,
    senders: Mutex<LruCache<String, SenderHandle>>,
}

impl SenderRegistry {
    pub fn new(config: HistoryConfig) -> Self {
        let senders = Mutex::new(LruCache::unbounded());
        Self { config, senders }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// State handle for `sender`, created on first sight.
    pub fn handle(&self, sender: &str) -> Result<SenderHandle, RegistryError> {
        let mut senders = self.senders.lock().map_err(|_| RegistryError::LockPoisoned)?;
        if let Some(handle) = senders.get(sender) {
            return Ok(Arc::clone(handle));
        }
        let handle = Arc::new(tokio::sync::Mutex::new(SenderState::new(&self.config)));
        senders.put(sender.to_string(), Arc::clone(&handle));
        trim_idle(&mut senders, self.config.max_senders.max(1));
        Ok(handle)
    }

    pub fn get(&self, sender: &str) -> Result<Option<SenderHandle>, RegistryError> {
        let senders = self.senders.lock().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(senders.peek(sender).map(Arc::clone))
    }

    pub fn len(&self) -> usize {
        self.senders.lock().map(|senders| senders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes sessions idle for at least the configured TTL. Senders busy in a
    /// worker are skipped and picked up by a later sweep.
    pub fn evict_idle_sessions(&self, now_ms: i64) -> Result<usize, RegistryError> {
        let handles: Vec<SenderHandle> = {
            let senders = self.senders.lock().map_err(|_| RegistryError::LockPoisoned)?;
            senders.iter().map(|(_, handle)| Arc::clone(handle)).collect()
        };

        let mut evicted = 0;
        for handle in handles {
            let Ok(mut state) = handle.try_lock() else {
                continue;
            };
            let idle = state
                .session
                .as_ref()
                .is_some_and(|session| session.is_idle(now_ms, self.config.session_ttl_ms));
            if idle {
                state.session = None;
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    pub fn open_sessions(&self) -> usize {
        let Ok(senders) = self.senders.lock() else {
            return 0;
        };
        senders
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|state| state.session.is_some())
                    .unwrap_or(false)
            })
            .count()
    }
}

/// Drops least recently used senders nobody else holds until `max` remain.
/// Runs under the registry lock, which every handle clone goes through, so a
/// strong count of one cannot rise concurrently.
fn trim_idle(senders: &mut LruCache<String, SenderHandle>, max: usize) {
    while senders.len() > max {
        let idle = senders
            .iter()
            .rev()
            .find(|(_, handle)| Arc::strong_count(handle) == 1)
            .map(|(sender, _)| sender.clone());
        let Some(sender) = idle else {
            debug!(
                tracked = senders.len(),
                max, "every tracked sender is busy; registry over capacity"
            );
            return;
        };
        senders.pop(&sender);
        debug!(sender = %sender, "sender state evicted from registry");
    }
}
