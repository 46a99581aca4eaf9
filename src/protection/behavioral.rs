use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::settings::BehaverConfig;
use crate::models::client::ClientKey;
use crate::models::threat::Detection;

/// Behavior monitor thresholds, taken from the `[behaver]` section.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// Ceiling on tracked clients. 0 disables monitoring.
    pub max_clients: usize,
    /// Window length in seconds. Also the suspension length.
    pub window_secs: u64,
    /// More than this many 404s inside one window is a flood.
    pub not_found_limit: u32,
    /// Number of recent timestamps the scan detector looks at.
    pub scan_sample: usize,
    /// Largest delta-to-delta difference (seconds) still counted as uniform.
    pub scan_tolerance: u64,
    /// Uniform differences needed to flag a client.
    pub scan_matches: usize,
    /// Timestamps kept per client.
    pub history: usize,
}

impl BehaviorConfig {
    pub fn disabled() -> Self {
        Self {
            max_clients: 0,
            ..Self::from(&crate::config::defaults::default_behaver_config())
        }
    }
}

impl From<&BehaverConfig> for BehaviorConfig {
    fn from(cfg: &BehaverConfig) -> Self {
        Self {
            max_clients: cfg.ipmax,
            window_secs: cfg.expire,
            not_found_limit: cfg.notfound_limit,
            scan_sample: cfg.scan_sample,
            scan_tolerance: cfg.scan_tolerance,
            scan_matches: cfg.scan_matches,
            history: cfg.history.max(cfg.scan_sample),
        }
    }
}

#[derive(Debug, Clone)]
struct BehaviorRecord {
    first_seen: u64,
    not_found: u32,
    /// Most recent request times in seconds, oldest first, non-decreasing.
    timestamps: VecDeque<u64>,
}

impl BehaviorRecord {
    fn new(now: u64, history: usize) -> Self {
        Self {
            first_seen: now,
            not_found: 0,
            timestamps: VecDeque::with_capacity(history),
        }
    }

    fn window_open(&self, window_secs: u64, now: u64) -> bool {
        self.first_seen.saturating_add(window_secs) > now
    }

    fn reset(&mut self, now: u64) {
        self.first_seen = now;
        self.not_found = 0;
        self.timestamps.clear();
    }

    fn push(&mut self, now: u64, history: usize) {
        let ts = self.timestamps.back().map_or(now, |&last| last.max(now));
        while self.timestamps.len() >= history.max(1) {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(ts);
    }
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_removed: usize,
    pub suspensions_removed: usize,
}

#[derive(Debug, Default)]
struct MonitorState {
    records: HashMap<ClientKey, BehaviorRecord>,
    /// Client -> suspension expiry (seconds).
    suspensions: HashMap<ClientKey, u64>,
}

/// Tracks per-client request cadence and 404 counts, and keeps the list of
/// suspended clients.
///
/// States per client: untracked, tracked (has a record), suspended (has a
/// suspension entry and no record). A single mutex guards both maps.
pub struct BehaviorMonitor {
    config: BehaviorConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl BehaviorMonitor {
    pub fn new(config: BehaviorConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            enabled = config.max_clients > 0,
            max_clients = config.max_clients,
            window_secs = config.window_secs,
            not_found_limit = config.not_found_limit,
            scan_sample = config.scan_sample,
            "Behavior monitor initialised"
        );
        Self {
            config,
            clock,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.max_clients > 0
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Record the outcome of a completed request.
    ///
    /// Starts a new record (or resets an expired one) and appends the
    /// current time. A 404 bumps the flood counter. Suspended clients are
    /// not recorded.
    pub fn record(&self, key: &ClientKey, status: u16) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_secs();
        let cfg = &self.config;
        let mut state = self.state.lock();

        if state.suspensions.get(key).is_some_and(|&exp| exp > now) {
            return;
        }

        if !state.records.contains_key(key) && state.records.len() >= cfg.max_clients {
            Self::make_room(&mut state, cfg, now);
        }

        let record = state
            .records
            .entry(key.clone())
            .or_insert_with(|| BehaviorRecord::new(now, cfg.history));

        if !record.window_open(cfg.window_secs, now) {
            record.reset(now);
        }
        record.push(now, cfg.history);
        if status == 404 {
            record.not_found = record.not_found.saturating_add(1);
        }
    }

    /// Flood detector: more than `not_found_limit` 404s inside an open window.
    pub fn check_not_found(&self, key: &ClientKey) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let now = self.clock.now_secs();
        let state = self.state.lock();
        state
            .records
            .get(key)
            .is_some_and(|r| self.is_flooding(r, now))
    }

    /// Scan detector: near-constant cadence over the most recent requests.
    pub fn check_scan(&self, key: &ClientKey) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let state = self.state.lock();
        state.records.get(key).is_some_and(|r| self.is_scanning(r))
    }

    /// Run both detectors under one lock. Flood takes precedence.
    pub fn detect(&self, key: &ClientKey) -> Option<Detection> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now_secs();
        let state = self.state.lock();
        let record = state.records.get(key)?;
        if self.is_flooding(record, now) {
            Some(Detection::NotFoundFlood)
        } else if self.is_scanning(record) {
            Some(Detection::UniformCadence)
        } else {
            None
        }
    }

    /// Drop the client's record and suspend it for one window.
    pub fn suspend(&self, key: &ClientKey) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now_secs();
        let expires_at = now.saturating_add(self.config.window_secs);
        let mut state = self.state.lock();
        state.records.remove(key);
        state.suspensions.insert(key.clone(), expires_at);
        debug!(client = %key, expires_at = expires_at, "Client suspended");
    }

    /// True while the client's suspension has not expired. An expired
    /// entry is removed on the way out.
    pub fn is_suspended(&self, key: &ClientKey) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let now = self.clock.now_secs();
        let mut state = self.state.lock();
        match state.suspensions.get(key).copied() {
            Some(expires_at) if expires_at > now => true,
            Some(_) => {
                state.suspensions.remove(key);
                false
            }
            None => false,
        }
    }

    /// Remove a suspension ahead of time. Returns whether one existed.
    pub fn lift(&self, key: &ClientKey) -> bool {
        self.state.lock().suspensions.remove(key).is_some()
    }

    /// Prune records whose window closed and suspensions that expired.
    pub fn sweep(&self) -> SweepReport {
        if !self.is_enabled() {
            return SweepReport::default();
        }
        let now = self.clock.now_secs();
        let window = self.config.window_secs;
        let mut state = self.state.lock();

        let records_before = state.records.len();
        state.records.retain(|_, r| r.window_open(window, now));
        let suspensions_before = state.suspensions.len();
        state.suspensions.retain(|_, &mut exp| exp > now);

        SweepReport {
            records_removed: records_before - state.records.len(),
            suspensions_removed: suspensions_before - state.suspensions.len(),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn suspended_clients(&self) -> usize {
        self.state.lock().suspensions.len()
    }

    /// 404 count in the client's current record.
    pub fn not_found_count(&self, key: &ClientKey) -> Option<u32> {
        self.state.lock().records.get(key).map(|r| r.not_found)
    }

    /// Timestamps currently held for the client.
    pub fn history(&self, key: &ClientKey) -> Option<Vec<u64>> {
        self.state
            .lock()
            .records
            .get(key)
            .map(|r| r.timestamps.iter().copied().collect())
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.suspensions.clear();
    }

    fn is_flooding(&self, record: &BehaviorRecord, now: u64) -> bool {
        record.window_open(self.config.window_secs, now)
            && record.not_found > self.config.not_found_limit
    }

    fn is_scanning(&self, record: &BehaviorRecord) -> bool {
        let cfg = &self.config;
        uniform_cadence(
            record.timestamps.iter().copied(),
            cfg.scan_sample,
            cfg.scan_tolerance,
            cfg.scan_matches,
        )
    }

    /// Make space for one more record: drop closed windows, then the
    /// oldest half by `first_seen` if that was not enough.
    fn make_room(state: &mut MonitorState, cfg: &BehaviorConfig, now: u64) {
        state.records.retain(|_, r| r.window_open(cfg.window_secs, now));
        if state.records.len() < cfg.max_clients {
            return;
        }

        let count = (state.records.len() / 2).max(1);
        let mut order: Vec<(u64, ClientKey)> = state
            .records
            .iter()
            .map(|(k, r)| (r.first_seen, k.clone()))
            .collect();
        order.sort_unstable();
        for (_, key) in order.into_iter().take(count) {
            state.records.remove(&key);
        }
        debug!(
            evicted = count,
            remaining = state.records.len(),
            "Behavior monitor at capacity, evicted oldest records"
        );
    }
}

/// Cadence-uniformity heuristic.
///
/// Takes the last `sample` timestamps, computes the `sample - 1` gaps
/// between them and the `sample - 2` absolute differences between
/// consecutive gaps. Returns true when at least `matches` of those
/// differences are `<= tolerance`.
pub fn uniform_cadence(
    timestamps: impl ExactSizeIterator<Item = u64>,
    sample: usize,
    tolerance: u64,
    matches: usize,
) -> bool {
    let len = timestamps.len();
    if sample < 3 || len < sample {
        return false;
    }

    let recent: Vec<u64> = timestamps.skip(len - sample).collect();
    let gaps: Vec<u64> = recent.windows(2).map(|w| w[1].saturating_sub(w[0])).collect();
    let uniform = gaps
        .windows(2)
        .filter(|w| w[1].abs_diff(w[0]) <= tolerance)
        .count();

    uniform >= matches
}
