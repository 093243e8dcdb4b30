//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → routing (axum route per reflected descriptor)
//!     → dispatch.rs (guard, authorize, bind, advise, validate, invoke)
//!         → stream/ (unidirectional or bidirectional session), or
//!         → response.rs (status and envelope)
//!     → middleware/erroring.rs (queued errors → error envelope)
//!     → Send to client
//! ```

pub(crate) mod dispatch;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod stream;

pub use request::{
    Direction, Order, RequestCollection, RequestContext, RequestExtracting, RequestPagination,
    RequestQuerying, RequestSorting, X_REQUEST_ID,
};
pub use response::{ErrorBody, EventType, PageResponse, Pagination, TypedResponse};
pub use server::HttpServer;
pub use stream::{BidiStream, StreamError, UnidiStream};
