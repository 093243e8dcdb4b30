//! Bidirectional streaming over a websocket.
//!
//! # Data Flow
//! ```text
//! upgrade ─→ socket.split()
//!              ├─ reader task: first data frame → oneshot, later → mpsc,
//!              │               pong → notify, close/EOF → cancel
//!              ├─ pinger task: ping every period, cancel on missing pong
//!              └─ handler:     BidiStream::recv / send
//! handler returns → close frame → cancel → log sizes
//! ```
//!
//! # Design Decisions
//! - The first read happens eagerly so a peer close is noticed even when
//!   the handler only writes
//! - The close frame write is bounded by the handshake timeout

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{close_code, is_downstream_close, SessionTracker, StreamError, StreamKind};
use crate::config::StreamConfig;
use crate::error::ApiError;
use crate::http::request::RequestContext;
use crate::observability::metrics;

const CHANNEL_CAPACITY: usize = 64;
/// Close reasons must fit in a control frame.
const MAX_CLOSE_REASON: usize = 123;

type Sink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Default)]
struct Counters {
    read: AtomicU64,
    write: AtomicU64,
}

struct Shared {
    ctx: RequestContext,
    sink: Sink,
    first: Mutex<Option<oneshot::Receiver<Bytes>>>,
    rest: Mutex<mpsc::Receiver<Bytes>>,
    counters: Arc<Counters>,
    closed: Arc<StdMutex<Option<(u16, String)>>>,
}

/// Websocket session handed to `bidi_stream` requests.
#[derive(Clone)]
pub struct BidiStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for BidiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BidiStream")
            .field("request_id", &self.shared.ctx.request_id())
            .finish_non_exhaustive()
    }
}

impl BidiStream {
    pub fn context(&self) -> &RequestContext {
        &self.shared.ctx
    }

    /// Next data frame from the peer, text or binary.
    pub async fn recv(&self) -> Result<Bytes, StreamError> {
        let first = self.shared.first.lock().await.take();
        let next = match first {
            Some(first) => tokio::select! {
                _ = self.shared.ctx.cancelled() => None,
                data = first => data.ok(),
            },
            None => {
                let mut rest = self.shared.rest.lock().await;
                tokio::select! {
                    _ = self.shared.ctx.cancelled() => None,
                    data = rest.recv() => data,
                }
            }
        };
        next.ok_or_else(|| self.close_error())
    }

    pub async fn recv_json<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        let data = self.recv().await?;
        serde_json::from_slice(&data).map_err(|e| StreamError::Decode(e.to_string()))
    }

    /// Send a binary frame.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), StreamError> {
        let data = data.into();
        let len = data.len() as u64;
        self.write(Message::Binary(data), len).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), StreamError> {
        let text = text.into();
        let len = text.len() as u64;
        self.write(Message::Text(text.into()), len).await
    }

    /// Send a JSON document as a text frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), StreamError> {
        let text = serde_json::to_string(value).map_err(|e| StreamError::Decode(e.to_string()))?;
        self.send_text(text).await
    }

    async fn write(&self, message: Message, len: u64) -> Result<(), StreamError> {
        if self.shared.ctx.is_cancelled() {
            return Err(self.close_error());
        }
        let mut sink = self.shared.sink.lock().await;
        tokio::select! {
            _ = self.shared.ctx.cancelled() => Err(self.close_error()),
            sent = sink.send(message) => {
                sent.map_err(|e| StreamError::Transport(e.to_string()))?;
                self.shared.counters.write.fetch_add(len, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn close_error(&self) -> StreamError {
        let closed = self
            .shared
            .closed
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        match closed {
            Some((code, reason)) => StreamError::Closed { code, reason },
            None => StreamError::Canceled,
        }
    }
}

/// Upgrade the connection and run `run` on the session.
pub(crate) async fn serve<F, Fut>(
    parts: &mut Parts,
    ctx: RequestContext,
    config: &StreamConfig,
    sessions: &SessionTracker,
    summary: String,
    run: F,
) -> Result<Response, ApiError>
where
    F: FnOnce(BidiStream) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
{
    let upgrade = WebSocketUpgrade::from_request_parts(parts, &())
        .await
        .map_err(|rejection| {
            debug!(error = %rejection.body_text(), "websocket upgrade rejected");
            ApiError::http(rejection.status(), rejection.body_text())
        })?;

    let config = config.clone();
    let guard = sessions.track(StreamKind::Bidi);
    let response = upgrade
        .read_buffer_size(config.read_buffer_size)
        .write_buffer_size(config.write_buffer_size)
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            session(socket, ctx, config, summary, run).await;
        });
    Ok(response)
}

async fn session<F, Fut>(
    socket: WebSocket,
    ctx: RequestContext,
    config: StreamConfig,
    summary: String,
    run: F,
) where
    F: FnOnce(BidiStream) -> Fut,
    Fut: Future<Output = Result<(), ApiError>>,
{
    let token = ctx.token().clone();
    let (sink, stream) = socket.split();
    let sink: Sink = Arc::new(Mutex::new(sink));
    let counters = Arc::new(Counters::default());
    let closed = Arc::new(StdMutex::new(None));
    let pong = Arc::new(Notify::new());

    let (first_tx, first_rx) = oneshot::channel();
    let (rest_tx, rest_rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(read_loop(
        stream,
        token.clone(),
        first_tx,
        rest_tx,
        Arc::clone(&pong),
        Arc::clone(&counters),
        Arc::clone(&closed),
    ));
    tokio::spawn(ping_loop(Arc::clone(&sink), token.clone(), pong, config.clone()));

    let timeout = config.timeout();
    let stream = BidiStream {
        shared: Arc::new(Shared {
            ctx,
            sink: Arc::clone(&sink),
            first: Mutex::new(Some(first_rx)),
            rest: Mutex::new(rest_rx),
            counters: Arc::clone(&counters),
            closed,
        }),
    };

    let result = tokio::select! {
        r = run(stream) => r,
        _ = token.cancelled() => Err(StreamError::Canceled.into()),
        _ = tokio::time::sleep(timeout) => Err(StreamError::DeadlineExceeded.into()),
    };

    let (code, reason) = close_frame(&result);
    if let Err(err) = &result {
        if !is_downstream_close(err, StreamKind::Bidi) {
            error!(route = %summary, error = %err, "error processing bidirectional stream request");
        }
    }

    if !token.is_cancelled() {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        let write = async {
            let mut sink = sink.lock().await;
            sink.send(frame).await
        };
        match tokio::time::timeout(config.handshake_timeout(), write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "failed to write close frame"),
            Err(_) => debug!("timed out writing close frame"),
        }
    }
    token.cancel();

    let request_size = counters.read.load(Ordering::Relaxed);
    let response_size = counters.write.load(Ordering::Relaxed);
    metrics::record_stream_bytes(StreamKind::Bidi.as_str(), "read", request_size);
    metrics::record_stream_bytes(StreamKind::Bidi.as_str(), "write", response_size);
    info!(
        route = %summary,
        close_code = code,
        request_size,
        response_size,
        "bidirectional stream closed"
    );
}

/// Close code and reason for a finished handler.
fn close_frame(result: &Result<(), ApiError>) -> (u16, String) {
    let err = match result {
        Ok(()) => return (close_code::NORMAL, "closed".to_string()),
        Err(err) => err,
    };
    if let ApiError::Stream(StreamError::Closed { code, reason }) = err {
        return (*code, truncate(reason));
    }
    if is_downstream_close(err, StreamKind::Bidi) {
        return (close_code::NORMAL, "closed".to_string());
    }
    let message = match err {
        ApiError::Wrapped { source, .. } => source.to_string(),
        e => e.public_message().unwrap_or_else(|| "internal error".to_string()),
    };
    (close_code::INTERNAL, truncate(&message))
}

fn truncate(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    token: CancellationToken,
    first: oneshot::Sender<Bytes>,
    rest: mpsc::Sender<Bytes>,
    pong: Arc<Notify>,
    counters: Arc<Counters>,
    closed: Arc<StdMutex<Option<(u16, String)>>>,
) {
    let mut first = Some(first);
    let record_close = |code: u16, reason: String| {
        if let Ok(mut slot) = closed.lock() {
            slot.get_or_insert((code, reason));
        }
    };

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = stream.next() => next,
        };
        let data = match next {
            None => {
                record_close(close_code::ABNORMAL, "unexpected EOF".to_string());
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                record_close(close_code::ABNORMAL, e.to_string());
                break;
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (f.code, f.reason.as_str().to_string()))
                    .unwrap_or((close_code::NORMAL, String::new()));
                record_close(code, reason);
                break;
            }
            Some(Ok(Message::Pong(_))) => {
                pong.notify_one();
                continue;
            }
            Some(Ok(Message::Ping(_))) => continue,
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
        };

        counters.read.fetch_add(data.len() as u64, Ordering::Relaxed);
        if let Some(first) = first.take() {
            if first.send(data).is_err() {
                break;
            }
            continue;
        }
        let forwarded = tokio::select! {
            _ = token.cancelled() => break,
            sent = rest.send(data) => sent,
        };
        if forwarded.is_err() {
            break;
        }
    }
    token.cancel();
}

async fn ping_loop(sink: Sink, token: CancellationToken, pong: Arc<Notify>, config: StreamConfig) {
    let period = config.ping_period();
    let wait = config.pong_wait();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // Sending the ping and receiving the pong share one deadline.
        let deadline = Instant::now() + wait;
        let ping = async {
            let mut sink = sink.lock().await;
            sink.send(Message::Ping(Bytes::new())).await
        };
        match tokio::time::timeout_at(deadline, ping).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "failed to send ping");
                token.cancel();
                return;
            }
            Err(_) => {
                debug!("timed out sending ping");
                token.cancel();
                return;
            }
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = pong.notified() => {}
            _ = tokio::time::sleep_until(deadline) => {
                debug!(wait_ms = wait.as_millis() as u64, "pong not received in time");
                token.cancel();
                return;
            }
        }
    }
}

/// Liveness bound of an unresponsive peer: one ping period plus the pong deadline.
pub fn liveness_bound(config: &StreamConfig) -> Duration {
    config.ping_period() + config.pong_wait()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_codes() {
        assert_eq!(close_frame(&Ok(())), (1000, "closed".to_string()));

        let closed = Err(ApiError::Stream(StreamError::Closed {
            code: 4001,
            reason: "bye".into(),
        }));
        assert_eq!(close_frame(&closed), (4001, "bye".to_string()));

        let downstream = Err(ApiError::Stream(StreamError::Canceled));
        assert_eq!(close_frame(&downstream), (1000, "closed".to_string()));

        let failed = Err(ApiError::wrap(ApiError::other("disk full"), "saving"));
        assert_eq!(close_frame(&failed), (1011, "disk full".to_string()));
    }

    #[test]
    fn test_truncate_reason() {
        let long = "é".repeat(100);
        let cut = truncate(&long);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_liveness_bound() {
        let config = StreamConfig::default();
        assert_eq!(liveness_bound(&config), Duration::from_millis(9_500));
    }
}
