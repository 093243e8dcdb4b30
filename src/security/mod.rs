//! Security subsystem.
//!
//! # Responsibilities
//! - Per-client-IP rate limiting (rate_limit.rs)
//!
//! Authorization is per route, see `routing::Authorizer`. Body size and
//! request timeouts are enforced by tower-http layers in `http::server`.

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiterState};
