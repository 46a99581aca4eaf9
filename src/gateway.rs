use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::settings::Settings;
use crate::error::GatewayError;
use crate::models::request::GatewayRequest;
use crate::models::response::GatewayResponse;
use crate::protection::behavioral::{BehaviorConfig, BehaviorMonitor};
use crate::protection::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::protection::sweeper::{spawn_sweeper, SweeperHandle};
use crate::routing::router::Router;
use crate::server::access_log::{self, AccessLog};
use crate::server::dispatcher::Dispatcher;
use crate::server::listener::HttpServer;
use crate::storage::response_cache::ResponseCache;

/// Owns every subsystem for one process.
///
/// Built once from [`Settings`] and a frozen [`Router`]; torn down with
/// [`Gateway::shutdown`]. Construction validates the settings, then spawns
/// the access-log writer and the sweeper, so it must happen inside a tokio
/// runtime.
pub struct Gateway {
    settings: Arc<Settings>,
    dispatcher: Arc<Dispatcher>,
    sweeper: Option<SweeperHandle>,
}

impl Gateway {
    pub fn new(settings: Settings, router: Router) -> Result<Self, GatewayError> {
        Self::with_clock(settings, router, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: Settings,
        router: Router,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        settings
            .validate()
            .map_err(|e| GatewayError::Config(format!("{:#}", e)))?;

        let rate_limiter = Arc::new(RateLimiter::new(
            RateLimitConfig::from(&settings.server),
            Arc::clone(&clock),
        ));
        let behavior = Arc::new(BehaviorMonitor::new(
            BehaviorConfig::from(&settings.behaver),
            Arc::clone(&clock),
        ));
        let cache = Arc::new(ResponseCache::new(settings.server.cache_bytes(), clock));

        let (access_log, _writer) =
            AccessLog::spawn_or_fallback(&settings.logging.access_log, access_log::DEFAULT_CAPACITY);

        let sweeper = spawn_sweeper(
            Arc::clone(&behavior),
            Arc::clone(&cache),
            Duration::from_secs(settings.behaver.cleansecond),
        );

        info!(
            rate_limiter = rate_limiter.is_enabled(),
            behavior_monitor = behavior.is_enabled(),
            cache = cache.is_enabled(),
            sweeper = sweeper.is_some(),
            routes = router.len(),
            "Gateway initialised"
        );

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(router),
            behavior,
            rate_limiter,
            cache,
            Arc::new(access_log),
        ));

        Ok(Self {
            settings: Arc::new(settings),
            dispatcher,
            sweeper,
        })
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        self.dispatcher.cache()
    }

    pub fn behavior(&self) -> &Arc<BehaviorMonitor> {
        self.dispatcher.behavior()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.dispatcher.rate_limiter()
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|s| !s.is_finished())
    }

    pub async fn dispatch(&self, req: GatewayRequest) -> GatewayResponse {
        self.dispatcher.dispatch(req).await
    }

    /// HTTP listener on `server.bind` serving this gateway's dispatcher.
    pub fn http_server(&self) -> HttpServer {
        HttpServer::new(
            &self.settings.server.bind,
            self.settings.server.max_connections,
            self.settings.server.max_body_size,
            Arc::clone(&self.dispatcher),
        )
    }

    /// Stop the sweeper and forget all client, suspension and cache state.
    /// The access-log writer drains and exits once the last dispatcher
    /// reference is dropped.
    pub fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        self.dispatcher.rate_limiter().clear();
        self.dispatcher.behavior().clear();
        self.dispatcher.cache().clear();
        info!(
            dropped_access_events = self.dispatcher.access_log().dropped(),
            "Gateway shut down"
        );
    }
}
