//! Unidirectional streaming over a chunked HTTP response.
//!
//! The handler runs on its own task and pushes chunks through a bounded
//! channel; the response body drains that channel. When the client goes
//! away the body is dropped, which cancels the session token.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{is_downstream_close, SessionTracker, StreamError, StreamKind};
use crate::config::StreamConfig;
use crate::error::ApiError;
use crate::http::request::RequestContext;
use crate::observability::metrics;

const SEND_TIMEOUT: Duration = Duration::from_secs(1);
const CHANNEL_CAPACITY: usize = 16;

/// Server-to-client stream handed to `unidi_stream` requests.
#[derive(Debug)]
pub struct UnidiStream {
    ctx: RequestContext,
    tx: mpsc::Sender<Bytes>,
}

impl UnidiStream {
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Push one chunk; fails if the client is gone or stops reading.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), StreamError> {
        let data = data.into();
        let len = data.len() as u64;
        tokio::select! {
            _ = self.ctx.cancelled() => Err(StreamError::Canceled),
            sent = tokio::time::timeout(SEND_TIMEOUT, self.tx.send(data)) => match sent {
                Err(_) => Err(StreamError::Blocked),
                Ok(Err(_)) => Err(StreamError::Disconnected),
                Ok(Ok(())) => {
                    metrics::record_stream_bytes(StreamKind::Unidi.as_str(), "write", len);
                    Ok(())
                }
            },
        }
    }

    /// Push one JSON document.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), StreamError> {
        let data = serde_json::to_vec(value).map_err(|e| StreamError::Decode(e.to_string()))?;
        self.send(data).await
    }
}

/// Open a session and spawn `run` on it.
///
/// Response headers are fixed before the handler produces anything.
pub(crate) fn serve<F, Fut>(
    version: Version,
    ctx: RequestContext,
    config: &StreamConfig,
    sessions: &SessionTracker,
    summary: String,
    run: F,
) -> Result<Response, ApiError>
where
    F: FnOnce(UnidiStream) -> Fut,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    if version == Version::HTTP_10 || version == Version::HTTP_09 {
        return Err(StreamError::UpgradeRequired.into());
    }

    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    let token = ctx.token().clone();
    let guard = sessions.track(StreamKind::Unidi);
    let session = guard.id();

    let timeout = config.timeout();
    let deadline = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                debug!(%session, "stream session timed out");
                deadline.cancel();
            }
            _ = deadline.cancelled() => {}
        }
    });

    let work = run(UnidiStream { ctx, tx });
    let cancel = token.clone();
    tokio::spawn(async move {
        let _guard = guard;
        let result = tokio::select! {
            r = work => r,
            _ = cancel.cancelled() => Err(StreamError::Canceled.into()),
        };
        if let Err(err) = result {
            if !is_downstream_close(&err, StreamKind::Unidi) {
                error!(%session, route = %summary, error = %err, "error processing unidirectional stream request");
            }
        }
        cancel.cancel();
    });

    let body = Body::from_stream(futures_util::stream::unfold(
        (rx, token.drop_guard()),
        |(mut rx, guard)| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, Infallible>(chunk), (rx, guard)))
        },
    ));

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream; charset=UTF-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}
