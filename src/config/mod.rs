pub mod defaults;
pub mod settings;

pub use settings::{BehaverConfig, LoggingConfig, ServerConfig, Settings};
