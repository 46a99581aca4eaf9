pub mod client;
pub mod request;
pub mod response;
pub mod threat;
