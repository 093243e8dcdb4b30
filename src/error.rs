//! Error taxonomy and HTTP status mapping.
//!
//! # Responsibilities
//! - Define the error type every handler method returns (`ApiError`)
//! - Represent the persistence layer's failure modes (`StoreError`)
//! - Resolve an HTTP status for any error: explicit status first,
//!   otherwise inferred by walking the cause chain
//!
//! # Status Mapping
//! ```text
//! Bind / Validation        → 400
//! UnsupportedMediaType     → 415
//! Http { status }          → status
//! StoreError::NotFound     → 404   (NotSingular as well)
//! StoreError::Constraint   → 409
//! StoreError::NotLoaded    → 422
//! anything else            → 503
//! ```
//!
//! # Design Decisions
//! - Private errors keep their cause out of the response body but are
//!   always logged by the error-normalizing layer
//! - Rendering happens once, in `http::middleware::erroring`

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::bind::BindError;
use crate::http::response::ErrorBody;
use crate::http::stream::StreamError;

/// Boxed error used as an opaque cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure modes reported by the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} not singular")]
    NotSingular(String),

    #[error("{0}")]
    Constraint(String),

    #[error("{0} edge not loaded")]
    NotLoaded(String),

    #[error("{0}")]
    Unavailable(String),
}

impl StoreError {
    /// HTTP status inferred from the store failure.
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) | StoreError::NotSingular(_) => StatusCode::NOT_FOUND,
            StoreError::Constraint(_) => StatusCode::CONFLICT,
            StoreError::NotLoaded(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Rejection returned by a request's `validate` hook.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Error returned by handler methods and raised by the dispatcher.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported media type {0:?}")]
    UnsupportedMediaType(String),

    /// Pre-classified error carrying an explicit status.
    #[error("{}", status_text(.status, .message))]
    Http {
        status: StatusCode,
        message: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Message wrapper; the status comes from the wrapped cause.
    #[error("{message}: {source}")]
    Wrapped {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Cause muted from the response body.
    #[error("{0}")]
    Private(#[source] BoxError),

    #[error(transparent)]
    Other(BoxError),
}

fn status_text(status: &StatusCode, message: &Option<String>) -> String {
    match message {
        Some(m) => m.clone(),
        None => status.canonical_reason().unwrap_or("unknown").to_string(),
    }
}

impl ApiError {
    /// Error with an explicit status and message.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: Some(message.into()),
            source: None,
        }
    }

    /// Error with an explicit status and no message.
    pub fn bare(status: StatusCode) -> Self {
        ApiError::Http {
            status,
            message: None,
            source: None,
        }
    }

    /// Attach an explicit status to an existing cause.
    pub fn with_status<E>(status: StatusCode, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source = source.into();
        ApiError::Http {
            status,
            message: Some(source.to_string()),
            source: Some(source),
        }
    }

    /// Prefix a cause with context; the status is still inferred from it.
    pub fn wrap<E>(source: E, message: impl Into<String>) -> Self
    where
        E: Into<BoxError>,
    {
        ApiError::Wrapped {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Hide the cause from the client.
    pub fn private<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ApiError::Private(source.into())
    }

    pub fn other<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ApiError::Other(source.into())
    }

    /// Whether a private cause sits anywhere in this error's chain.
    pub fn is_private(&self) -> bool {
        match self {
            ApiError::Private(_) => true,
            ApiError::Wrapped { source, .. } | ApiError::Other(source) => {
                chain_is_private(source.as_ref())
            }
            ApiError::Http {
                source: Some(source),
                ..
            } => chain_is_private(source.as_ref()),
            _ => false,
        }
    }

    /// Resolve the HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Bind(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Http { status, .. } => *status,
            ApiError::Store(e) => e.status(),
            ApiError::Stream(e) => e.status(),
            ApiError::Wrapped { source, .. }
            | ApiError::Private(source)
            | ApiError::Other(source) => infer_status(source.as_ref()),
        }
    }

    /// Message exposed in the response body, if any.
    pub fn public_message(&self) -> Option<String> {
        if self.is_private() {
            return None;
        }
        match self {
            ApiError::Http { message, .. } => message.clone(),
            e => Some(e.to_string()),
        }
    }

    /// Render the error envelope directly, bypassing the error queue.
    pub fn to_response(&self) -> Response {
        let status = self.status();
        (status, axum::Json(ErrorBody::new(status, self.public_message()))).into_response()
    }
}

/// Walk the cause chain looking for a classified error.
fn infer_status(err: &(dyn StdError + 'static)) -> StatusCode {
    let mut cause = Some(err);
    while let Some(e) = cause {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return api.status();
        }
        if let Some(store) = e.downcast_ref::<StoreError>() {
            return store.status();
        }
        cause = e.source();
    }
    StatusCode::SERVICE_UNAVAILABLE
}

fn chain_is_private(err: &(dyn StdError + 'static)) -> bool {
    let mut cause = Some(err);
    while let Some(e) = cause {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return api.is_private();
        }
        cause = e.source();
    }
    false
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}
