//! Request-scoped context and reusable request pieces.
//!
//! # Responsibilities
//! - Carry the request ID and cancellation token into handlers (`RequestContext`)
//! - Provide the common collection query parameters: pagination, sorting,
//!   field extraction and fuzzy querying
//!
//! # Design Decisions
//! - Request ID assigned by the outermost layer (UUID v4) and propagated
//!   back in the response header
//! - The context token is cancelled when the client goes away, so handlers
//!   observe disconnects without polling the connection

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::bind::{Bind, Schema};
use crate::error::ValidationError;
use crate::routing::inflect::underscore;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Per-request context handed to handlers that ask for it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    token: CancellationToken,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the request is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cancel(&self) {
        self.token.cancel()
    }

    /// Context cancelled with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            token: self.token.child_token(),
        }
    }
}

/// `?page=1&perPage=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPagination {
    pub page: i64,
    pub per_page: i64,
}

impl Default for RequestPagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
        }
    }
}

impl Bind for RequestPagination {
    fn schema(s: &mut Schema<Self>) {
        s.field("page", r#"query:"page,default=1""#, |r| &mut r.page)
            .field("per_page", r#"query:"perPage,default=100""#, |r| &mut r.per_page);
    }
}

impl RequestPagination {
    pub fn limit(&self) -> i64 {
        if self.per_page <= 0 {
            100
        } else {
            self.per_page
        }
    }

    pub fn offset(&self) -> i64 {
        self.limit()
            .saturating_mul(self.page.saturating_sub(1))
            .max(0)
    }

    /// `(limit, offset)`, or `None` when no page was requested.
    pub fn paging(&self) -> Option<(i64, i64)> {
        (self.page > 0).then(|| (self.limit(), self.offset()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One resolved sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// `?sort=-createTime&sort=name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSorting {
    pub sorts: Vec<String>,
}

impl Bind for RequestSorting {
    fn schema(s: &mut Schema<Self>) {
        s.field("sorts", r#"query:"sort,omitempty""#, |r| &mut r.sorts);
    }
}

impl RequestSorting {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sorts.iter().any(|s| s.trim().is_empty()) {
            return Err("blank sort value is not allowed".into());
        }
        Ok(())
    }

    pub fn with_asc(mut self, fields: &[&str]) -> Self {
        self.sorts
            .extend(fields.iter().filter(|f| !f.is_empty()).map(|f| f.to_string()));
        self
    }

    pub fn with_desc(mut self, fields: &[&str]) -> Self {
        self.sorts
            .extend(fields.iter().filter(|f| !f.is_empty()).map(|f| format!("-{}", f)));
        self
    }

    /// Requested orders restricted to `allow`; each key is honoured once.
    ///
    /// Keys not in the allow list are retried in snake_case. Falls back to
    /// `default` when nothing usable was requested.
    pub fn sorting(&self, allow: &[&str], default: Vec<Order>) -> Vec<Order> {
        if self.sorts.is_empty() || allow.is_empty() {
            return default;
        }

        let mut allowed: HashSet<&str> = allow.iter().copied().collect();
        let mut orders = Vec::new();
        for sort in &self.sorts {
            let (direction, key) = match sort.as_bytes().first() {
                None => continue,
                Some(b'-') => (Direction::Desc, &sort[1..]),
                Some(b'+') => (Direction::Asc, &sort[1..]),
                Some(_) => (Direction::Asc, sort.as_str()),
            };
            if let Some(field) = take_allowed(&mut allowed, key) {
                orders.push(Order { field, direction });
            }
        }

        if orders.is_empty() {
            default
        } else {
            orders
        }
    }
}

fn take_allowed(allowed: &mut HashSet<&str>, key: &str) -> Option<String> {
    if allowed.remove(key) {
        return Some(key.to_string());
    }
    let snake = underscore(key);
    if snake != key && allowed.remove(snake.as_str()) {
        return Some(snake);
    }
    None
}

/// `?extract=-id&extract=name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestExtracting {
    pub extracts: Vec<String>,
}

impl Bind for RequestExtracting {
    fn schema(s: &mut Schema<Self>) {
        s.field("extracts", r#"query:"extract,omitempty""#, |r| &mut r.extracts);
    }
}

impl RequestExtracting {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.extracts.iter().any(|s| s.trim().is_empty()) {
            return Err("blank extract value is not allowed".into());
        }
        Ok(())
    }

    pub fn with(mut self, fields: &[&str]) -> Self {
        self.extracts
            .extend(fields.iter().filter(|f| !f.is_empty()).map(|f| f.to_string()));
        self
    }

    pub fn without(mut self, fields: &[&str]) -> Self {
        self.extracts
            .extend(fields.iter().filter(|f| !f.is_empty()).map(|f| format!("-{}", f)));
        self
    }

    /// Fields to select, restricted to `allow`; `-field` excludes.
    pub fn extracting(&self, allow: &[&str], default: &[&str]) -> Vec<String> {
        let fallback = || default.iter().map(|f| f.to_string()).collect();
        if self.extracts.is_empty() || allow.is_empty() {
            return fallback();
        }

        let mut allowed: HashSet<&str> = allow.iter().copied().collect();
        let mut fields = Vec::new();
        let candidates = self
            .extracts
            .iter()
            .map(String::as_str)
            .chain(default.iter().copied());
        for candidate in candidates {
            let (with, key) = match candidate.as_bytes().first() {
                None => continue,
                Some(b'-') => (false, &candidate[1..]),
                Some(b'+') => (true, &candidate[1..]),
                Some(_) => (true, candidate),
            };
            if let Some(field) = take_allowed(&mut allowed, key) {
                if with {
                    fields.push(field);
                }
            }
        }

        if fields.is_empty() {
            fallback()
        } else {
            fields
        }
    }
}

/// `?query=repo%2Fname`, a case-insensitive fuzzy filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuerying {
    pub query: Option<String>,
}

impl Bind for RequestQuerying {
    fn schema(s: &mut Schema<Self>) {
        s.field("query", r#"query:"query,omitempty""#, |r| &mut r.query);
    }
}

impl RequestQuerying {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.query {
            Some(q) if q.trim().is_empty() => Err("blank query value is not allowed".into()),
            _ => Ok(()),
        }
    }
}

/// Querying, sorting, extracting and pagination in one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCollection {
    pub querying: RequestQuerying,
    pub sorting: RequestSorting,
    pub extracting: RequestExtracting,
    pub pagination: RequestPagination,
}

impl Bind for RequestCollection {
    fn schema(s: &mut Schema<Self>) {
        s.inline("querying", r#"query:",inline""#, |r| &mut r.querying)
            .inline("sorting", r#"query:",inline""#, |r| &mut r.sorting)
            .inline("extracting", r#"query:",inline""#, |r| &mut r.extracting)
            .inline("pagination", r#"query:",inline""#, |r| &mut r.pagination);
    }
}

impl RequestCollection {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.querying.validate()?;
        self.sorting.validate()?;
        self.extracting.validate()
    }
}
