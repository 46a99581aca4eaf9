use std::fmt;
use std::sync::Arc;

use crate::error::MiddlewareError;
use crate::models::request::GatewayRequest;

type MiddlewareFn = dyn Fn(&GatewayRequest) -> Result<(), MiddlewareError> + Send + Sync;

/// A named request check. Returning an error aborts the chain; the error's
/// message becomes the 500 response body.
#[derive(Clone)]
pub struct Middleware {
    name: Arc<str>,
    check: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn new<F>(name: &str, check: F) -> Self
    where
        F: Fn(&GatewayRequest) -> Result<(), MiddlewareError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(&self, req: &GatewayRequest) -> Result<(), MiddlewareError> {
        (self.check)(req)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").field("name", &self.name).finish()
    }
}
