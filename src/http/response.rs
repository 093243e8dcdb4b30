//! Response envelopes and rendering.
//!
//! # Responsibilities
//! - Error envelope `{status, statusText, message}`
//! - Pagination envelope `{items, pagination}` for collection reads
//! - Typed push envelope `{type, items}` for stream messages
//! - Pick the success status from the route shape
//!
//! # Status Rules
//! ```text
//! Empty  → 202 for non-custom non-GET, else 200
//! Json   → 201 for non-custom POST, else 200; null renders a bare status
//! Raw    → as produced by the handler
//! Page   → 200 with the pagination envelope
//! ```

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::routing::{Reply, Route};

/// Body of every error response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: u16,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: Option<String>) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
        }
    }
}

/// Pagination block of a collection read.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_page: i64,
    pub partial: bool,
    pub next_page: i64,
}

impl Pagination {
    /// `page`/`per_page` not above zero fall back to 1/100.
    pub fn new(page: i64, per_page: i64, total: i64, items: usize) -> Self {
        let page = if page > 0 { page } else { 1 };
        let per_page = if per_page > 0 { per_page } else { 100 };
        let total = total.max(0);

        let total_page = total / per_page + i64::from(total % per_page != 0);
        let partial = i64::try_from(items).map_or(false, |items| items < total);
        let next_page = page
            .checked_add(1)
            .filter(|next| partial && *next <= total_page)
            .unwrap_or(0);

        Self {
            page,
            per_page,
            total,
            total_page,
            partial,
            next_page,
        }
    }
}

/// `{"items": [...], "pagination": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct PageResponse<T> {
    pub items: T,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// Push message sent over a stream: `{"type": "create", "items": [...]}`.
#[derive(Debug, Clone, Serialize)]
pub struct TypedResponse<T> {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub items: Vec<T>,
}

impl<T> TypedResponse<T> {
    pub fn new(event_type: EventType, items: Vec<T>) -> Self {
        Self { event_type, items }
    }

    pub fn created(items: Vec<T>) -> Self {
        Self::new(EventType::Create, items)
    }

    pub fn updated(items: Vec<T>) -> Self {
        Self::new(EventType::Update, items)
    }

    pub fn deleted(items: Vec<T>) -> Self {
        Self::new(EventType::Delete, items)
    }
}

/// Turn a handler reply into the HTTP response for `route`.
///
/// `page` is the `(page, perPage)` pair read from the query.
pub(crate) fn render(route: &Route, reply: Reply, page: (i64, i64)) -> Response {
    let profile = &route.profile;
    match reply {
        Reply::Empty => {
            if !profile.custom && profile.method != Method::GET {
                StatusCode::ACCEPTED.into_response()
            } else {
                StatusCode::OK.into_response()
            }
        }
        Reply::Raw(response) => response,
        Reply::Json(value) => {
            let status = if !profile.custom && profile.method == Method::POST {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            if value.is_null() {
                return status.into_response();
            }
            if !profile.custom && profile.collection && profile.method == Method::POST {
                return (status, Json(serde_json::json!({ "items": value }))).into_response();
            }
            (status, Json(value)).into_response()
        }
        Reply::Page { items, total } => {
            let len = match &items {
                Value::Array(items) => items.len(),
                Value::Null => 0,
                _ => 1,
            };
            let items = if items.is_null() {
                Value::Array(Vec::new())
            } else {
                items
            };
            let pagination = Pagination::new(page.0, page.1, total, len);
            (StatusCode::OK, Json(PageResponse { items, pagination })).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_middle_page() {
        let p = Pagination::new(2, 10, 37, 10);
        assert_eq!(
            p,
            Pagination {
                page: 2,
                per_page: 10,
                total: 37,
                total_page: 4,
                partial: true,
                next_page: 3,
            }
        );
    }

    #[test]
    fn test_pagination_last_page_and_fallbacks() {
        let p = Pagination::new(4, 10, 37, 7);
        assert_eq!(p.total_page, 4);
        assert_eq!(p.next_page, 0);

        let p = Pagination::new(0, -3, 5, 5);
        assert_eq!((p.page, p.per_page), (1, 100));
        assert!(!p.partial);
        assert_eq!(p.next_page, 0);
    }

    #[test]
    fn test_pagination_extremes() {
        let p = Pagination::new(i64::MAX, 10, 37, 0);
        assert_eq!(p.page, i64::MAX);
        assert_eq!(p.total_page, 4);
        assert_eq!(p.next_page, 0);

        let p = Pagination::new(1, 10, i64::MAX, 0);
        assert_eq!(p.total_page, i64::MAX / 10 + 1);
        assert!(p.partial);
        assert_eq!(p.next_page, 2);

        let p = Pagination::new(i64::MAX, i64::MAX, i64::MAX, 0);
        assert_eq!(p.total_page, 1);
        assert_eq!(p.next_page, 0);
    }

    #[test]
    fn test_pagination_serialization() {
        let body = serde_json::to_value(Pagination::new(1, 2, 3, 2)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "page": 1, "perPage": 2, "total": 3,
                "totalPage": 2, "partial": true, "nextPage": 2
            })
        );
    }

    #[test]
    fn test_error_body() {
        let body = serde_json::to_value(ErrorBody::new(StatusCode::CONFLICT, Some("dup".into())))
            .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"status": 409, "statusText": "Conflict", "message": "dup"})
        );

        let bare = serde_json::to_value(ErrorBody::new(StatusCode::NOT_FOUND, None)).unwrap();
        assert!(bare.get("message").is_none());
    }

    #[test]
    fn test_typed_response() {
        let body = serde_json::to_value(TypedResponse::deleted(vec!["a"])).unwrap();
        assert_eq!(body, serde_json::json!({"type": "delete", "items": ["a"]}));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_pagination_bounds(
                page in prop_oneof![-5i64..50, Just(i64::MAX)],
                per_page in prop_oneof![-5i64..200, Just(i64::MAX)],
                total in prop_oneof![0i64..10_000, Just(i64::MAX)],
                items in 0usize..200,
            ) {
                let p = Pagination::new(page, per_page, total, items);
                prop_assert!(p.page >= 1);
                prop_assert!(p.per_page >= 1);
                prop_assert!(p.total_page.saturating_mul(p.per_page) >= p.total);
                prop_assert!((p.total_page - 1).max(0).saturating_mul(p.per_page) < p.total.max(1));
                if p.next_page != 0 {
                    prop_assert!(p.partial);
                    prop_assert_eq!(p.next_page, p.page + 1);
                    prop_assert!(p.next_page <= p.total_page);
                }
            }
        }
    }
}
