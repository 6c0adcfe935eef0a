//! In-memory LRU cache over persisted sessions, the structural analogue of
//! the teacher's `InMemoryStore` but bounded by last-access eviction.

use std::time::Instant;

use dashmap::DashMap;

use crate::message::Message;

use super::types::Session;

/// Cached view of one session: pointer to the session row, cached messages,
/// a dirty flag, and the last-access timestamp used for LRU eviction.
pub struct CachedSession {
    pub session: Session,
    pub messages: Vec<Message>,
    pub dirty: bool,
    pub last_access: Instant,
}

impl CachedSession {
    fn new(session: Session, messages: Vec<Message>) -> Self {
        Self {
            session,
            messages,
            dirty: false,
            last_access: Instant::now(),
        }
    }
}

/// Bounded, `dashmap`-backed session cache. `capacity` bounds the number of
/// resident sessions; when exceeded, the entry with the oldest `last_access`
/// is evicted. Eviction never triggers persistence — the cache is always
/// write-through, so a dropped entry loses nothing durable.
pub struct SessionCache {
    entries: DashMap<String, CachedSession>,
    capacity: usize,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn get_messages(&self, id: &str) -> Option<Vec<Message>> {
        self.entries.get_mut(id).map(|mut e| {
            e.last_access = Instant::now();
            e.messages.clone()
        })
    }

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.entries.get_mut(id).map(|mut e| {
            e.last_access = Instant::now();
            e.session.clone()
        })
    }

    /// Inserts or overwrites a cache entry, then evicts if over capacity.
    pub fn put(&self, session: Session, messages: Vec<Message>) {
        self.entries
            .insert(session.id.clone(), CachedSession::new(session, messages));
        self.evict_if_over_capacity();
    }

    pub fn append_message(&self, id: &str, message: Message) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.messages.push(message);
            entry.last_access = Instant::now();
        }
    }

    pub fn set_metadata(&self, id: &str, metadata: serde_json::Value) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.session.metadata = metadata;
            entry.last_access = Instant::now();
        }
    }

    pub fn replace_messages(&self, id: &str, messages: Vec<Message>) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.messages = messages;
            entry.dirty = false;
            entry.last_access = Instant::now();
        }
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn evict_if_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.last_access)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Scenario;

    #[test]
    fn put_then_get_round_trips() {
        let cache = SessionCache::new(4);
        cache.put(Session::new("s1", Scenario::Chat), vec![Message::user("s1", "hi")]);
        assert_eq!(cache.get_messages("s1").unwrap().len(), 1);
        assert!(cache.get_session("s1").is_some());
    }

    #[test]
    fn eviction_drops_oldest_last_access_when_over_capacity() {
        let cache = SessionCache::new(2);
        cache.put(Session::new("s1", Scenario::Chat), vec![]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        cache.put(Session::new("s2", Scenario::Chat), vec![]);
        std::thread::sleep(std::time::Duration::from_millis(5));
        // touch s1 so it is now more recent than s2
        cache.get_session("s1");
        cache.put(Session::new("s3", Scenario::Chat), vec![]);
        assert!(cache.contains("s1"));
        assert!(!cache.contains("s2"));
        assert!(cache.contains("s3"));
    }

    #[test]
    fn invalidate_removes_entry_cache_only() {
        let cache = SessionCache::new(4);
        cache.put(Session::new("s1", Scenario::Chat), vec![]);
        cache.invalidate("s1");
        assert!(!cache.contains("s1"));
    }
}
