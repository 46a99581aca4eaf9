pub mod access_log;
pub mod dispatcher;
pub mod http_handler;
pub mod listener;

pub use dispatcher::Dispatcher;
pub use listener::HttpServer;
