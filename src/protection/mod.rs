pub mod behavioral;
pub mod identity;
pub mod pipeline;
pub mod rate_limiter;
pub mod sweeper;

pub use behavioral::BehaviorMonitor;
pub use pipeline::AdmissionPipeline;
pub use rate_limiter::RateLimiter;
