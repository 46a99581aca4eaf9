use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::models::client::ClientKey;
use crate::models::request::GatewayRequest;
use crate::models::response::GatewayResponse;
use crate::storage::response_cache::ResponseCache;

/// Everything a handler gets for one request.
#[derive(Clone)]
pub struct HandlerContext {
    pub request: Arc<GatewayRequest>,
    pub client: ClientKey,
    pub cache: Arc<ResponseCache>,
}

impl HandlerContext {
    /// Cached payload for this request's target (GET only).
    pub fn cached(&self) -> Option<Bytes> {
        self.cache.lookup_request(&self.request)
    }

    /// Cache `payload` for this request's target (GET only).
    pub fn cache_for(&self, ttl_minutes: u64, payload: impl Into<Bytes>) {
        self.cache
            .store_request(&self.request, ttl_minutes, payload.into());
    }
}

/// Application code behind a route.
///
/// Implemented for every `Fn(HandlerContext) -> impl Future<Output =
/// GatewayResponse>`, so async closures and `async fn`s register directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, GatewayResponse>;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = GatewayResponse> + Send + 'static,
{
    fn call(&self, ctx: HandlerContext) -> BoxFuture<'static, GatewayResponse> {
        (self)(ctx).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn context(target: &str, cache_bytes: usize) -> HandlerContext {
        HandlerContext {
            request: Arc::new(GatewayRequest::get(target)),
            client: ClientKey::from("10.0.0.1"),
            cache: Arc::new(ResponseCache::new(cache_bytes, Arc::new(ManualClock::at_secs(1)))),
        }
    }

    async fn hello(ctx: HandlerContext) -> GatewayResponse {
        GatewayResponse::ok(format!("hello {}", ctx.client))
    }

    #[tokio::test]
    async fn test_async_fn_is_a_handler() {
        let handler: Arc<dyn Handler> = Arc::new(hello);
        let resp = handler.call(context("/", 0)).await;
        assert_eq!(resp.body, Bytes::from("hello 10.0.0.1"));
    }

    #[tokio::test]
    async fn test_context_cache_helpers() {
        let ctx = context("/cache?page=2", 1024);
        assert!(ctx.cached().is_none());
        ctx.cache_for(1, "rendered");
        assert_eq!(ctx.cached(), Some(Bytes::from("rendered")));
        assert_eq!(ctx.cache.lookup("/cache?page=2"), Some(Bytes::from("rendered")));
    }
}
