//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → drain in-flight requests → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup in `main`: config, logging, metrics, routes, listener
//! - Stream sessions end with their connections; draining does not wait
//!   for the 10-minute session timeout

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
