pub mod auth;
pub mod kraken;
pub mod messages;
pub mod rate_limiter;
pub mod stream;
pub mod traits;
