pub mod client;
pub mod gateway;
pub mod limiter;
pub mod retry;

pub use client::*;
pub use gateway::*;
pub use limiter::*;
pub use retry::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("model endpoint unreachable at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("model API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("model rate limit hit: {0}")]
    RateLimited(String),

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Only rate-limit responses are retried; everything else is terminal
    /// for the call.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
