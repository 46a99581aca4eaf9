pub mod handler;
pub mod middleware;
pub mod router;

pub use handler::{Handler, HandlerContext};
pub use middleware::Middleware;
pub use router::{Route, Router, RouterBuilder};
