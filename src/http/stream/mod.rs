//! Streaming transports.
//!
//! # Data Flow
//! ```text
//! GET ?watch=true          → unidi.rs (chunked octet stream, server → client)
//! GET + websocket upgrade  → bidi.rs  (frames both ways, ping/pong liveness)
//! ```
//!
//! # Responsibilities
//! - Classify stream requests before dispatch
//! - Tell downstream closes (client went away) apart from real failures
//! - Track open sessions for diagnostics and metrics
//!
//! # Design Decisions
//! - Every session owns a cancellation token; client disconnect, ping
//!   failure and the session timeout all cancel it
//! - Downstream closes are expected and never logged as errors

pub mod bidi;
pub mod unidi;

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::error::ApiError;
use crate::observability::metrics;

pub use bidi::BidiStream;
pub use unidi::UnidiStream;

/// Websocket close codes used by the bidirectional transport.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL: u16 = 1002;
    pub const ABNORMAL: u16 = 1006;
    pub const INTERNAL: u16 = 1011;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Unidi,
    Bidi,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Unidi => "unidi",
            StreamKind::Bidi => "bidi",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream session failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// Websocket close received from, or to be sent to, the peer.
    #[error("websocket closed: {code} {reason}")]
    Closed { code: u16, reason: String },

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("client disconnected")]
    Disconnected,

    #[error("timeout sending: blocked buffer")]
    Blocked,

    #[error("stream transport: {0}")]
    Transport(String),

    #[error("upgrade required")]
    UpgradeRequired,

    #[error("malformed stream message: {0}")]
    Decode(String),
}

impl StreamError {
    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
            StreamError::Decode(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this error only means the client went away.
    pub fn is_downstream_close(&self, kind: StreamKind) -> bool {
        match (self, kind) {
            (StreamError::Canceled | StreamError::DeadlineExceeded, _) => true,
            (StreamError::Disconnected, StreamKind::Unidi) => true,
            (StreamError::Transport(msg), StreamKind::Unidi) => {
                msg.contains("client disconnected") || msg.contains("stream closed")
            }
            (StreamError::Closed { code, .. }, StreamKind::Bidi) => matches!(
                *code,
                close_code::ABNORMAL | close_code::PROTOCOL | close_code::GOING_AWAY
            ),
            _ => false,
        }
    }
}

/// Walk the cause chain for a downstream close.
pub fn is_downstream_close(err: &ApiError, kind: StreamKind) -> bool {
    let mut cause: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = cause {
        if let Some(ApiError::Stream(stream)) = e.downcast_ref::<ApiError>() {
            return stream.is_downstream_close(kind);
        }
        if let Some(stream) = e.downcast_ref::<StreamError>() {
            return stream.is_downstream_close(kind);
        }
        cause = e.source();
    }
    false
}

/// `GET ...?watch=true`, case-insensitively.
pub fn is_unidi_request(method: &Method, query: Option<&str>) -> bool {
    if method != Method::GET {
        return false;
    }
    let Some(query) = query else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes())
        .any(|(k, v)| k == "watch" && v.eq_ignore_ascii_case("true"))
}

/// `GET` with `Connection: upgrade` and `Upgrade: websocket`.
pub fn is_bidi_request(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET {
        return false;
    }
    let has_token = |name: header::HeaderName, token: &str| {
        headers.get_all(name).iter().any(|v| {
            v.to_str()
                .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
                .unwrap_or(false)
        })
    };
    has_token(header::CONNECTION, "upgrade") && has_token(header::UPGRADE, "websocket")
}

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique stream session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Counts open stream sessions.
#[derive(Debug, Default)]
pub struct SessionTracker {
    unidi: Arc<AtomicU64>,
    bidi: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. The returned guard ends it on drop.
    pub fn track(&self, kind: StreamKind) -> SessionGuard {
        let count = Arc::clone(self.counter(kind));
        count.fetch_add(1, Ordering::SeqCst);
        metrics::record_stream_session(kind.as_str(), 1.0);
        SessionGuard {
            count,
            kind,
            id: SessionId::new(),
        }
    }

    pub fn active(&self, kind: StreamKind) -> u64 {
        self.counter(kind).load(Ordering::SeqCst)
    }

    pub fn total_active(&self) -> u64 {
        self.active(StreamKind::Unidi) + self.active(StreamKind::Bidi)
    }

    fn counter(&self, kind: StreamKind) -> &Arc<AtomicU64> {
        match kind {
            StreamKind::Unidi => &self.unidi,
            StreamKind::Bidi => &self.bidi,
        }
    }
}

/// Lifetime of one stream session.
#[derive(Debug)]
pub struct SessionGuard {
    count: Arc<AtomicU64>,
    kind: StreamKind,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_stream_session(self.kind.as_str(), -1.0);
    }
}
