//! In-process HTTP request gateway.
//!
//! Every request passes through the same fixed sequence: client identity,
//! behavior detectors and suspension check, per-client token bucket, global
//! middleware, route middleware, handler. The handler may consult the
//! response cache, and the final status is fed back into the behavior
//! monitor.

pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod protection;
pub mod routing;
pub mod server;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use error::{GatewayError, MiddlewareError};
pub use gateway::Gateway;
pub use models::client::ClientKey;
pub use models::request::GatewayRequest;
pub use models::response::GatewayResponse;
pub use routing::{Handler, HandlerContext, Middleware, Router, RouterBuilder};
