use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use tracing::{info, warn};

use super::handler::Handler;
use super::middleware::Middleware;

/// A registered handler with its route-scoped middleware.
#[derive(Clone)]
pub struct Route {
    handler: Arc<dyn Handler>,
    middleware: Vec<Middleware>,
}

impl Route {
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }
}

/// Collects routes and global middleware at startup.
#[derive(Default)]
pub struct RouterBuilder {
    /// path -> method -> route
    routes: HashMap<String, HashMap<Method, Route>>,
    global: Vec<Middleware>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for an exact `(method, path)`. Registering the
    /// same pair twice replaces the earlier route.
    pub fn route<H: Handler>(
        mut self,
        method: Method,
        path: &str,
        handler: H,
        middleware: Vec<Middleware>,
    ) -> Self {
        let route = Route {
            handler: Arc::new(handler),
            middleware,
        };
        let by_method = self.routes.entry(path.to_string()).or_default();
        if by_method.insert(method.clone(), route).is_some() {
            warn!(method = %method, path = path, "Route registered twice, keeping the latest");
        }
        self
    }

    pub fn get<H: Handler>(self, path: &str, handler: H, middleware: Vec<Middleware>) -> Self {
        self.route(Method::GET, path, handler, middleware)
    }

    pub fn post<H: Handler>(self, path: &str, handler: H, middleware: Vec<Middleware>) -> Self {
        self.route(Method::POST, path, handler, middleware)
    }

    /// Append middleware that runs for every request, before route middleware.
    pub fn use_global(mut self, middleware: Middleware) -> Self {
        self.global.push(middleware);
        self
    }

    pub fn build(self) -> Router {
        let routes: usize = self.routes.values().map(HashMap::len).sum();
        info!(routes = routes, global_middleware = self.global.len(), "Router built");
        Router {
            routes: self.routes,
            global: self.global,
        }
    }
}

/// Immutable route table. Shared by `Arc` and read without locking.
pub struct Router {
    routes: HashMap<String, HashMap<Method, Route>>,
    global: Vec<Middleware>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Exact match on method and path (no query string).
    pub fn resolve(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes.get(path)?.get(method)
    }

    pub fn global_middleware(&self) -> &[Middleware] {
        &self.global
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
