use super::settings::{BehaverConfig, LoggingConfig, ServerConfig};

// ---------------------------------------------------------------------------
// Top-level struct defaults
// ---------------------------------------------------------------------------

pub fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        ipmax: 0,
        ratelimit: default_ratelimit(),
        refill_ms: default_refill_ms(),
        cache: 0,
        max_connections: default_max_connections(),
        max_body_size: default_max_body_size(),
    }
}

pub fn default_behaver_config() -> BehaverConfig {
    BehaverConfig {
        ipmax: default_behaver_ipmax(),
        expire: default_expire(),
        cleansecond: default_cleansecond(),
        notfound_limit: default_notfound_limit(),
        scan_sample: default_scan_sample(),
        scan_tolerance: default_scan_tolerance(),
        scan_matches: default_scan_matches(),
        history: default_history(),
    }
}

pub fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file: String::new(),
        access_log: String::new(),
    }
}

// ---------------------------------------------------------------------------
// ServerConfig field defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn default_ratelimit() -> u32 {
    100
}

pub fn default_refill_ms() -> u64 {
    1_000
}

pub fn default_max_connections() -> usize {
    10_000
}

pub fn default_max_body_size() -> usize {
    1024 * 1024
}

// ---------------------------------------------------------------------------
// BehaverConfig field defaults
// ---------------------------------------------------------------------------

pub fn default_behaver_ipmax() -> usize {
    1_000
}

pub fn default_expire() -> u64 {
    300
}

pub fn default_cleansecond() -> u64 {
    300
}

pub fn default_notfound_limit() -> u32 {
    50
}

pub fn default_scan_sample() -> usize {
    10
}

pub fn default_scan_tolerance() -> u64 {
    1
}

pub fn default_scan_matches() -> usize {
    8
}

pub fn default_history() -> usize {
    32
}

// ---------------------------------------------------------------------------
// LoggingConfig field defaults
// ---------------------------------------------------------------------------

pub fn default_log_level() -> String {
    "info".to_string()
}
