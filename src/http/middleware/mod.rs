//! HTTP middleware.
//!
//! # Layer Order (outermost first)
//! ```text
//! request id → trace → catch panic → timeout → body limit → erroring
//!     → rate limit → erroring (router) → routing → observing (metrics)
//!     → dispatch
//! ```

pub mod erroring;
pub mod observing;

pub use erroring::{erroring, queue, QueuedError};
pub use observing::observing;
