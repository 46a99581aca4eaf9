use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::client::ClientKey;
use crate::models::threat::Admission;

use super::behavioral::BehaviorMonitor;
use super::rate_limiter::RateLimiter;

/// Admission checks run for every request before any middleware.
///
/// Order:
///
/// 1. behavior detectors on the client's pre-request state; a hit suspends
///    the client,
/// 2. suspension check,
/// 3. rate limiter.
///
/// Each step takes its subsystem's lock on its own; no lock is held across
/// steps.
pub struct AdmissionPipeline {
    pub behavior: Arc<BehaviorMonitor>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AdmissionPipeline {
    pub fn new(behavior: Arc<BehaviorMonitor>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            behavior,
            rate_limiter,
        }
    }

    pub fn admit(&self, client: &ClientKey) -> Admission {
        if let Some(detection) = self.behavior.detect(client) {
            warn!(client = %client, detection = %detection, "Suspending client");
            self.behavior.suspend(client);
        }

        if self.behavior.is_suspended(client) {
            debug!(client = %client, "Rejected: client suspended");
            return Admission::Suspended;
        }

        if !self.rate_limiter.admit(client) {
            debug!(client = %client, "Rejected: rate limit exceeded");
            return Admission::Throttled;
        }

        Admission::Pass
    }
}
