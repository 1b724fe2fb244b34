//! Server module
//!
//! HTTP surface of the gateway: routing, origin guard, rate limiting,
//! error mapping, and the four API handlers.

pub mod csrf;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod http;
pub mod metrics;
pub mod ratelimit;

pub use error::ApiError;
pub use http::{build_router, serve, AppState, AppStateBuilder, ServerError};
pub use ratelimit::{Decision, RateLimiter, Route};
