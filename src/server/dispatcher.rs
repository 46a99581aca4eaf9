use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::models::client::ClientKey;
use crate::models::request::GatewayRequest;
use crate::models::response::GatewayResponse;
use crate::models::threat::Outcome;
use crate::protection::behavioral::BehaviorMonitor;
use crate::protection::identity::resolve_client_key;
use crate::protection::pipeline::AdmissionPipeline;
use crate::protection::rate_limiter::RateLimiter;
use crate::routing::handler::HandlerContext;
use crate::routing::router::Router;
use crate::storage::response_cache::ResponseCache;

use super::access_log::{AccessEvent, AccessLog};

/// A request head that passed admission.
#[derive(Debug)]
pub struct Admitted {
    client: ClientKey,
    start: Instant,
}

impl Admitted {
    pub fn client(&self) -> &ClientKey {
        &self.client
    }
}

/// Per-request orchestration.
///
/// For every request the dispatcher:
///
/// 1. Resolves the [`ClientKey`].
/// 2. Runs the [`AdmissionPipeline`]; a rejection answers 429 right away.
/// 3. Runs global middleware, then route middleware.
/// 4. Invokes the handler, or answers 404.
/// 5. Feeds the final status back into the [`BehaviorMonitor`].
/// 6. Emits one access-log event.
///
/// Steps 1 and 2 only look at the request head. The HTTP layer calls
/// [`Dispatcher::admit`] before it reads the body and [`Dispatcher::serve`]
/// after.
pub struct Dispatcher {
    router: Arc<Router>,
    admission: AdmissionPipeline,
    cache: Arc<ResponseCache>,
    access_log: Arc<AccessLog>,
}

impl Dispatcher {
    pub fn new(
        router: Arc<Router>,
        behavior: Arc<BehaviorMonitor>,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        access_log: Arc<AccessLog>,
    ) -> Self {
        Self {
            router,
            admission: AdmissionPipeline::new(behavior, rate_limiter),
            cache,
            access_log,
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn behavior(&self) -> &Arc<BehaviorMonitor> {
        &self.admission.behavior
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.admission.rate_limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.access_log
    }

    pub async fn dispatch(&self, req: GatewayRequest) -> GatewayResponse {
        match self.admit(&req) {
            Ok(admitted) => self.serve(req, admitted).await,
            Err(response) => response,
        }
    }

    /// Resolve the client and run admission. Reads method, target, headers
    /// and remote address only. A rejection is logged and returned as the
    /// 429 to send.
    pub fn admit(&self, head: &GatewayRequest) -> Result<Admitted, GatewayResponse> {
        let start = Instant::now();
        let client = resolve_client_key(&head.headers, &head.remote_addr);

        let admission = self.admission.admit(&client);
        match admission.rejection_message() {
            None => Ok(Admitted { client, start }),
            Some(message) => {
                let response = GatewayResponse::too_many_requests(message);
                self.log_access(head, client, &response, admission.into(), start);
                Err(response)
            }
        }
    }

    /// Run middleware and the handler for an admitted request.
    pub async fn serve(&self, req: GatewayRequest, admitted: Admitted) -> GatewayResponse {
        let req = Arc::new(req);
        let (response, outcome) = self.run_chain(&req, &admitted.client).await;
        self.finish(&req, admitted, response, outcome)
    }

    /// Record and log the response to an admitted request.
    pub fn finish(
        &self,
        req: &GatewayRequest,
        admitted: Admitted,
        response: GatewayResponse,
        outcome: Outcome,
    ) -> GatewayResponse {
        let Admitted { client, start } = admitted;
        self.admission
            .behavior
            .record(&client, response.status.as_u16());
        self.log_access(req, client, &response, outcome, start);
        response
    }

    async fn run_chain(
        &self,
        req: &Arc<GatewayRequest>,
        client: &ClientKey,
    ) -> (GatewayResponse, Outcome) {
        for middleware in self.router.global_middleware() {
            if let Err(e) = middleware.run(req) {
                debug!(client = %client, middleware = middleware.name(), error = %e, "Global middleware aborted request");
                return (GatewayResponse::internal_error(e.message()), Outcome::MiddlewareFailed);
            }
        }

        let Some(route) = self.router.resolve(&req.method, req.path()) else {
            debug!(client = %client, method = %req.method, path = req.path(), "No route");
            return (GatewayResponse::not_found(), Outcome::NotFound);
        };

        for middleware in route.middleware() {
            if let Err(e) = middleware.run(req) {
                debug!(client = %client, middleware = middleware.name(), error = %e, "Route middleware aborted request");
                return (GatewayResponse::internal_error(e.message()), Outcome::MiddlewareFailed);
            }
        }

        let ctx = HandlerContext {
            request: Arc::clone(req),
            client: client.clone(),
            cache: Arc::clone(&self.cache),
        };
        (route.handler().call(ctx).await, Outcome::Served)
    }

    fn log_access(
        &self,
        req: &GatewayRequest,
        client: ClientKey,
        response: &GatewayResponse,
        outcome: Outcome,
        start: Instant,
    ) {
        self.access_log.emit(AccessEvent {
            ts: chrono::Utc::now(),
            client,
            method: req.method.to_string(),
            target: req.target.clone(),
            status: response.status.as_u16(),
            outcome,
            us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
        });
    }
}
