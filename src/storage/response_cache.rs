use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::models::request::GatewayRequest;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Bytes,
    /// Absolute expiry, seconds.
    expires_at: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    size_bytes: usize,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.size_bytes -= entry.payload.len();
        Some(entry)
    }

    fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let mut freed = 0usize;
        self.entries.retain(|_, e| {
            if e.expires_at > now {
                true
            } else {
                freed += e.payload.len();
                false
            }
        });
        self.size_bytes -= freed;
        before - self.entries.len()
    }

    fn flush(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }
}

/// TTL cache of rendered payloads keyed by request target.
///
/// The aggregate is measured in payload bytes and bounded by `max_bytes`.
/// An insert that would cross the bound first purges expired entries, and
/// flushes everything if that frees nothing or not enough.
pub struct ResponseCache {
    max_bytes: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    /// `max_bytes == 0` disables the cache.
    pub fn new(max_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_bytes,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_bytes > 0
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_secs();
        let mut state = self.state.lock();
        match state.entries.get(key).map(|e| (e.expires_at, e.payload.clone())) {
            Some((expires_at, payload)) if expires_at > now => Some(payload),
            Some(_) => {
                state.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `payload` under `key` for `ttl_minutes`.
    pub fn store(&self, key: &str, ttl_minutes: u64, payload: Bytes) {
        if !self.is_enabled() {
            return;
        }
        let len = payload.len();
        if len > self.max_bytes {
            debug!(key = key, size = len, max = self.max_bytes, "Payload larger than cache, not stored");
            return;
        }

        let now = self.clock.now_secs();
        let expires_at = now.saturating_add(ttl_minutes.saturating_mul(60));
        let mut state = self.state.lock();

        state.remove(key);

        if state.size_bytes + len > self.max_bytes {
            let purged = state.purge_expired(now);
            if purged == 0 || state.size_bytes + len > self.max_bytes {
                debug!(
                    purged = purged,
                    entries = state.entries.len(),
                    size = state.size_bytes,
                    "Response cache full, flushing"
                );
                state.flush();
            }
        }

        state.size_bytes += len;
        state.entries.insert(key.to_string(), CacheEntry { payload, expires_at });
    }

    /// Cached payload for a GET request, keyed by its full target.
    pub fn lookup_request(&self, req: &GatewayRequest) -> Option<Bytes> {
        if !req.is_cacheable() {
            return None;
        }
        self.lookup(&req.target)
    }

    /// Store a payload for a GET request. Other methods are ignored.
    pub fn store_request(&self, req: &GatewayRequest, ttl_minutes: u64, payload: Bytes) {
        if req.is_cacheable() {
            self.store(&req.target, ttl_minutes, payload);
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        let now = self.clock.now_secs();
        self.state.lock().purge_expired(now)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.state.lock().size_bytes
    }

    pub fn clear(&self) {
        self.state.lock().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use http::Method;

    fn cache(max_bytes: usize) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(10_000));
        (ResponseCache::new(max_bytes, clock.clone()), clock)
    }

    #[test]
    fn test_store_and_lookup() {
        let (c, _clock) = cache(1024);
        c.store("/a", 1, Bytes::from_static(b"hello"));
        assert_eq!(c.lookup("/a"), Some(Bytes::from_static(b"hello")));
        assert_eq!(c.lookup("/b"), None);
        assert_eq!(c.size_bytes(), 5);
    }

    #[test]
    fn test_ttl_expiry() {
        let (c, clock) = cache(1024);
        c.store("/a", 1, Bytes::from_static(b"hello"));

        clock.advance_secs(59);
        assert!(c.lookup("/a").is_some());

        clock.advance_secs(1);
        assert!(c.lookup("/a").is_none());
        assert!(c.is_empty());
        assert_eq!(c.size_bytes(), 0);
    }

    #[test]
    fn test_query_strings_are_distinct_keys() {
        let (c, _clock) = cache(1024);
        c.store("/a?x=1", 5, Bytes::from_static(b"one"));
        c.store("/a?x=2", 5, Bytes::from_static(b"two"));
        assert_eq!(c.lookup("/a?x=1"), Some(Bytes::from_static(b"one")));
        assert_eq!(c.lookup("/a?x=2"), Some(Bytes::from_static(b"two")));
        assert_eq!(c.lookup("/a"), None);
    }

    #[test]
    fn test_replacement_adjusts_size() {
        let (c, _clock) = cache(1024);
        c.store("/a", 5, Bytes::from(vec![0u8; 100]));
        c.store("/a", 5, Bytes::from(vec![0u8; 40]));
        assert_eq!(c.len(), 1);
        assert_eq!(c.size_bytes(), 40);
    }

    #[test]
    fn test_overflow_purges_expired_first() {
        let (c, clock) = cache(100);
        c.store("/old", 1, Bytes::from(vec![0u8; 60]));
        clock.advance_secs(30);
        c.store("/fresh", 10, Bytes::from(vec![0u8; 30]));
        clock.advance_secs(30);

        // "/old" has expired, purging it makes room
        c.store("/new", 10, Bytes::from(vec![0u8; 50]));
        assert_eq!(c.len(), 2);
        assert!(c.lookup("/fresh").is_some());
        assert!(c.lookup("/new").is_some());
        assert_eq!(c.size_bytes(), 80);
    }

    #[test]
    fn test_overflow_without_expired_flushes() {
        let (c, _clock) = cache(100);
        c.store("/a", 10, Bytes::from(vec![0u8; 60]));
        c.store("/b", 10, Bytes::from(vec![0u8; 30]));
        c.store("/c", 10, Bytes::from(vec![0u8; 20]));

        assert_eq!(c.len(), 1);
        assert!(c.lookup("/a").is_none());
        assert!(c.lookup("/c").is_some());
        assert_eq!(c.size_bytes(), 20);
    }

    #[test]
    fn test_oversize_payload_is_not_stored() {
        let (c, _clock) = cache(10);
        c.store("/small", 10, Bytes::from_static(b"abc"));
        c.store("/big", 10, Bytes::from(vec![0u8; 11]));
        assert!(c.lookup("/big").is_none());
        assert!(c.lookup("/small").is_some());
    }

    #[test]
    fn test_disabled_cache() {
        let (c, _clock) = cache(0);
        assert!(!c.is_enabled());
        c.store("/a", 10, Bytes::from_static(b"x"));
        assert!(c.lookup("/a").is_none());
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_request_helpers_only_cache_reads() {
        let (c, _clock) = cache(1024);
        let post = GatewayRequest::post("/p?x=1");
        c.store_request(&post, 5, Bytes::from_static(b"post"));
        assert!(c.is_empty());

        let get = GatewayRequest::get("/p?x=1");
        c.store_request(&get, 5, Bytes::from_static(b"get"));
        assert_eq!(c.lookup_request(&get), Some(Bytes::from_static(b"get")));
        assert_eq!(c.lookup_request(&post), None);
    }

    #[test]
    fn test_head_neither_stores_nor_reads() {
        let (c, _clock) = cache(1024);
        let head = GatewayRequest::new(Method::HEAD, "/page");
        c.store_request(&head, 5, Bytes::new());
        assert!(c.is_empty());

        let get = GatewayRequest::get("/page");
        c.store_request(&get, 5, Bytes::from_static(b"full body"));
        assert_eq!(c.lookup_request(&head), None);
        assert_eq!(c.lookup_request(&get), Some(Bytes::from_static(b"full body")));
    }

    #[test]
    fn test_purge_expired_counts() {
        let (c, clock) = cache(1024);
        c.store("/a", 1, Bytes::from_static(b"a"));
        c.store("/b", 2, Bytes::from_static(b"b"));
        clock.advance_secs(61);
        assert_eq!(c.purge_expired(), 1);
        assert_eq!(c.len(), 1);
        assert_eq!(c.size_bytes(), 1);
    }
}
