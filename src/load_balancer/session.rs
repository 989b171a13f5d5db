//! Session affinity.
//!
//! A session pins its calls to the endpoint that served its first call.
//! The cache is bounded; the least recently used session is evicted first.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    slot: usize,
    last_seen: u64,
}

/// Bounded map from session id to endpoint slot.
#[derive(Debug)]
pub struct SessionCache {
    capacity: usize,
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    /// Endpoint slot pinned to `session`, marking it recently used.
    pub fn get(&mut self, session: &str) -> Option<usize> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(session).map(|entry| {
            entry.last_seen = clock;
            entry.slot
        })
    }

    /// Pin `session` to `slot`, evicting the least recently used session if full.
    pub fn insert(&mut self, session: &str, slot: usize) {
        self.clock += 1;
        if !self.entries.contains_key(session) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                self.entries.remove(&id);
            }
        }
        self.entries.insert(
            session.to_string(),
            SessionEntry {
                slot,
                last_seen: self.clock,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fresh random session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
