//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Handler (kind, sub-resource handlers, MethodSet)
//!     → reflect.rs (naming rules, signature checks, sort)
//!     → route.rs (Route descriptors: profile + attributes)
//!     → router.rs (groups, duplicate check, axum registration)
//!     → http::dispatch (per-request pipeline)
//! ```
//!
//! # Design Decisions
//! - Routes resolved at startup, immutable at runtime
//! - Deterministic: the same handler always yields the same routes in the
//!   same order
//! - Invalid methods are skipped with a log line; startup never aborts

pub mod advice;
pub mod authorize;
pub mod handler;
pub mod inflect;
pub mod profile;
pub mod reflect;
pub mod route;
pub mod router;

pub use advice::{AdviceProvider, AdviceTarget, RequestIdAdvice, ValueAdvice};
pub use authorize::{AllowAll, AuthorizeFn, Authorizer};
pub use handler::{alias, Capabilities, Handler, MethodSet, Outcome, Reply, Request, TotalCount};
pub use profile::{ResourceProfile, RouteProfile};
pub use reflect::reflect;
pub use route::{RequestAttributes, ResponseAttributes, Route};
pub use router::{ApiRouter, Group, RouterOptions};
