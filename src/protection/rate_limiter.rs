use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::config::settings::ServerConfig;
use crate::models::client::ClientKey;

/// Rate limiter limits, taken from the `[server]` section.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Ceiling on tracked clients. 0 disables the limiter.
    pub max_clients: usize,
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// One token is added per interval.
    pub refill_interval: Duration,
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            max_clients: 0,
            capacity: 0,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl From<&ServerConfig> for RateLimitConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            max_clients: cfg.ipmax,
            capacity: cfg.ratelimit,
            refill_interval: cfg.refill_interval(),
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: u32,
    last_refill_ms: u64,
    last_used_ms: u64,
    /// Insertion order, breaks `last_used_ms` ties during eviction.
    seq: u64,
}

impl TokenBucket {
    fn new(capacity: u32, now_ms: u64, seq: u64) -> Self {
        Self {
            tokens: capacity,
            last_refill_ms: now_ms,
            last_used_ms: now_ms,
            seq,
        }
    }

    /// Add one token per whole interval elapsed since the last refill.
    fn refill(&mut self, capacity: u32, interval_ms: u64, now_ms: u64) {
        if interval_ms == 0 || now_ms <= self.last_refill_ms {
            return;
        }
        let ticks = (now_ms - self.last_refill_ms) / interval_ms;
        if ticks == 0 {
            return;
        }
        let added = u32::try_from(ticks).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(added).min(capacity);
        self.last_refill_ms += ticks * interval_ms;
    }

    fn try_acquire(&mut self, capacity: u32, interval_ms: u64, now_ms: u64) -> bool {
        self.refill(capacity, interval_ms, now_ms);
        self.last_used_ms = self.last_used_ms.max(now_ms);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    buckets: HashMap<ClientKey, TokenBucket>,
    next_seq: u64,
}

impl LimiterState {
    /// Drop the least recently used half (at least one client).
    fn evict_oldest_half(&mut self) -> usize {
        let count = (self.buckets.len() / 2).max(1);
        let mut order: Vec<(u64, u64, ClientKey)> = self
            .buckets
            .iter()
            .map(|(k, b)| (b.last_used_ms, b.seq, k.clone()))
            .collect();
        order.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for (_, _, key) in order.into_iter().take(count) {
            self.buckets.remove(&key);
        }
        count
    }
}

/// Per-client token bucket admission control.
///
/// One mutex guards every bucket. When the number of tracked clients hits
/// `max_clients`, the least recently used half is evicted before a new
/// client is added.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.max_clients > 0
    }

    /// Consume one token for `key`. Always true when the limiter is disabled.
    pub fn admit(&self, key: &ClientKey) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = self.clock.now_millis();
        let capacity = self.config.capacity;
        let interval_ms = u64::try_from(self.config.refill_interval.as_millis()).unwrap_or(u64::MAX);

        let mut state = self.state.lock();

        if let Some(bucket) = state.buckets.get_mut(key) {
            let allowed = bucket.try_acquire(capacity, interval_ms, now);
            if !allowed {
                debug!(client = %key, capacity = capacity, "Token bucket empty");
            }
            return allowed;
        }

        if state.buckets.len() >= self.config.max_clients {
            let evicted = state.evict_oldest_half();
            debug!(
                evicted = evicted,
                remaining = state.buckets.len(),
                "Rate limiter at capacity, evicted least recently used clients"
            );
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let mut bucket = TokenBucket::new(capacity, now, seq);
        let allowed = bucket.try_acquire(capacity, interval_ms, now);
        state.buckets.insert(key.clone(), bucket);
        allowed
    }

    pub fn tracked_clients(&self) -> usize {
        self.state.lock().buckets.len()
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.state.lock().buckets.contains_key(key)
    }

    /// Tokens left for `key` right now, or `None` if it is not tracked.
    pub fn remaining(&self, key: &str) -> Option<u32> {
        let now = self.clock.now_millis();
        let interval_ms = u64::try_from(self.config.refill_interval.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.state.lock();
        state.buckets.get_mut(key).map(|b| {
            b.refill(self.config.capacity, interval_ms, now);
            b.tokens
        })
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.buckets.clear();
        state.next_seq = 0;
    }
}
