//! Request dispatch for reflected routes.
//!
//! # Data Flow
//! ```text
//! request
//!     → stream guard       (stream request on a non-stream route → 400)
//!     → authorize          (non-200 → abort with that status)
//!     → bind body          (form or JSON per content type, else 415)
//!     → bind header, query, path
//!     → inject context and advice
//!     → validate           (→ 400)
//!     → stream hand-off, or invoke and render
//! ```
//!
//! # Design Decisions
//! - The first abort is terminal; errors are queued for the error layer
//! - A non-stream request on a stream route is served like any other
//! - The request context is cancelled when the serving future is dropped,
//!   or, for streams, when the session ends

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, FromRequestParts, Multipart, RawPathParams};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tracing::debug;
use uuid::Uuid;

use crate::bind::{bind_form, bind_header, bind_json, bind_path, bind_query, parse_form, MultiMap};
use crate::config::StreamConfig;
use crate::error::ApiError;
use crate::http::middleware::queue;
use crate::http::request::{RequestContext, RequestPagination, X_REQUEST_ID};
use crate::http::response::render;
use crate::http::stream::{bidi, is_bidi_request, is_unidi_request, unidi, SessionTracker};
use crate::routing::handler::{MethodFn, Outcome, Request};
use crate::routing::{AdviceProvider, Authorizer, RequestAttributes, Route};

/// Shared by every route of one router.
pub(crate) struct Runtime {
    pub authorizer: Arc<dyn Authorizer>,
    pub advice: Vec<Arc<dyn AdviceProvider>>,
    pub stream: StreamConfig,
    pub sessions: Arc<SessionTracker>,
}

/// What a registered axum route closes over.
pub(crate) struct RouteState {
    pub route: Route,
    pub runtime: Arc<Runtime>,
}

pub(crate) async fn serve<R: Request, O: Outcome>(
    state: Arc<RouteState>,
    call: MethodFn<R, O>,
    request: axum::extract::Request,
) -> Response {
    match handle::<R, O>(&state, call, request).await {
        Ok(response) => response,
        Err(err) => queue(err),
    }
}

async fn handle<R: Request, O: Outcome>(
    state: &RouteState,
    call: MethodFn<R, O>,
    request: axum::extract::Request,
) -> Result<Response, ApiError> {
    let route = &state.route;
    let runtime = &state.runtime;
    let attrs = route.request_attributes;
    let (mut parts, body) = request.into_parts();

    let watch = is_unidi_request(&parts.method, parts.uri.query());
    let upgrade = is_bidi_request(&parts.method, &parts.headers);
    if (watch && !attrs.unidi_stream) || (upgrade && !attrs.bidi_stream) {
        return Err(ApiError::http(
            StatusCode::BAD_REQUEST,
            "stream request is not supported by this route",
        ));
    }

    let status = runtime.authorizer.authorize(&parts, &route.profile).await;
    if status != StatusCode::OK {
        debug!(route = %route.profile.summary, status = status.as_u16(), "unauthorized");
        return Err(ApiError::bare(status));
    }

    let mut req = R::default();
    if has_body(&parts.headers) {
        bind_body(&mut req, &route.request_attributes, &parts.headers, body).await?;
    }
    if attrs.bind_header {
        bind_header(&mut req, &parts.headers)?;
    }
    if attrs.bind_query {
        bind_query(&mut req, parts.uri.query())?;
    }
    if attrs.bind_path {
        let params = RawPathParams::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| ApiError::http(rejection.status(), rejection.body_text()))?;
        bind_path(&mut req, params.iter())?;
    }

    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let ctx = RequestContext::new(request_id);
    let cancel_on_drop = ctx.token().clone().drop_guard();
    if attrs.context {
        req.set_context(ctx.clone());
    }

    for provider in route
        .advice_providers
        .iter()
        .filter_map(|&i| runtime.advice.get(i))
    {
        provider.set(&mut req, &parts);
    }

    if attrs.validate {
        if let Err(err) = req.validate() {
            debug!(route = %route.profile.summary, error = %err, "validation failed");
            return Err(err.into());
        }
    }

    let summary = route.profile.summary.clone();
    if watch {
        cancel_on_drop.disarm();
        return unidi::serve(
            parts.version,
            ctx,
            &runtime.stream,
            &runtime.sessions,
            summary,
            move |stream| {
                req.set_unidi_stream(stream);
                let fut = call(req);
                async move { fut.await.map(|_| ()) }
            },
        );
    }
    if upgrade {
        cancel_on_drop.disarm();
        return bidi::serve(
            &mut parts,
            ctx,
            &runtime.stream,
            &runtime.sessions,
            summary,
            move |stream| {
                req.set_bidi_stream(stream);
                let fut = call(req);
                async move { fut.await.map(|_| ()) }
            },
        )
        .await;
    }

    let reply = call(req).await?.into_reply()?;
    let page = if route.response_attributes.page {
        requested_page(parts.uri.query())
    } else {
        (1, 100)
    };
    drop(cancel_on_drop);
    Ok(render(route, reply, page))
}

/// A declared length above zero, or a chunked body.
fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}

async fn bind_body<R: Request>(
    req: &mut R,
    attrs: &RequestAttributes,
    headers: &HeaderMap,
    body: Body,
) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/x-www-form-urlencoded" if attrs.bind_form => {
            let bytes = read_body(body).await?;
            let values = parse_form(&bytes)?;
            bind_form(req, &values)?;
        }
        "multipart/form-data" if attrs.bind_form => {
            let values = read_multipart(headers, body).await?;
            bind_form(req, &values)?;
        }
        m if attrs.bind_json && (m.is_empty() || m == "application/json" || m.ends_with("+json")) => {
            let bytes = read_body(body).await?;
            if !bytes.is_empty() {
                bind_json(req, &bytes)?;
            }
        }
        _ => return Err(ApiError::UnsupportedMediaType(content_type.to_string())),
    }
    Ok(())
}

async fn read_body(body: Body) -> Result<Bytes, ApiError> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ApiError::with_status(StatusCode::BAD_REQUEST, e))
}

/// Text fields of a multipart form; file parts are skipped.
async fn read_multipart(headers: &HeaderMap, body: Body) -> Result<MultiMap, ApiError> {
    let mut request = axum::extract::Request::new(body);
    *request.headers_mut() = headers.clone();
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| ApiError::http(rejection.status(), rejection.body_text()))?;

    let mut values = MultiMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::http(e.status(), e.body_text()))?
    {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let text = field
            .text()
            .await
            .map_err(|e| ApiError::http(e.status(), e.body_text()))?;
        values.entry(name).or_default().push(text);
    }
    Ok(values)
}

/// `(page, perPage)` from the query; malformed values use the defaults.
fn requested_page(query: Option<&str>) -> (i64, i64) {
    let mut pagination = RequestPagination::default();
    if bind_query(&mut pagination, query).is_err() {
        pagination = RequestPagination::default();
    }
    (pagination.page, pagination.per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_body() {
        let mut headers = HeaderMap::new();
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, "0".parse().unwrap());
        assert!(!has_body(&headers));
        headers.insert(header::CONTENT_LENGTH, "12".parse().unwrap());
        assert!(has_body(&headers));

        let mut chunked = HeaderMap::new();
        chunked.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        assert!(has_body(&chunked));
    }

    #[test]
    fn test_requested_page() {
        assert_eq!(requested_page(Some("page=2&perPage=10")), (2, 10));
        assert_eq!(requested_page(None), (1, 100));
        assert_eq!(requested_page(Some("page=x")), (1, 100));
    }
}
