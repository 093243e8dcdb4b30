//! Walrus API server runtime.
//!
//! Convention-driven request routing and streaming dispatch for a
//! control-plane API. Handlers declare a resource kind and name their
//! methods after the operation they implement; the router reflects those
//! names into REST routes, binds requests from path, header, query, form
//! and JSON sources, and serves plain, chunked-watch and websocket
//! responses.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (layers) ──▶ routing (reflected routes)
//!                                                    │
//!                                                    ▼
//!                                               http::dispatch
//!                                  guard → authorize → bind → advise → validate
//!                                                    │
//!                          ┌─────────────────────────┼──────────────────────┐
//!                          ▼                         ▼                      ▼
//!                   http::response          http::stream::unidi    http::stream::bidi
//!                  (status/envelope)        (chunked watch)        (websocket)
//!
//!     Cross-cutting: config, observability, lifecycle, security, error
//! ```

pub mod bind;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::ApiConfig;
pub use error::{ApiError, StoreError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::ApiRouter;
