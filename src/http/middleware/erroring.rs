//! Error-normalizing middleware.
//!
//! Handlers and the dispatcher never render errors themselves: they queue
//! the error on an otherwise empty response and this layer resolves it once
//! into the `{status, statusText, message}` envelope.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::error::ApiError;

/// Error waiting to be rendered by `erroring`.
#[derive(Debug, Clone)]
pub struct QueuedError(pub Arc<ApiError>);

/// Response carrying `err` for the error layer.
pub fn queue(err: ApiError) -> Response {
    let mut response = err.status().into_response();
    response.extensions_mut().insert(QueuedError(Arc::new(err)));
    response
}

pub async fn erroring(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;
    let Some(QueuedError(err)) = response.extensions_mut().remove::<QueuedError>() else {
        return response;
    };

    let status = err.status();
    if err.is_private() {
        error!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            error = %err,
            "private error"
        );
    } else {
        debug!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            error = %err,
            "request failed"
        );
    }

    let mut rendered = err.to_response();
    for (name, value) in response.headers() {
        if name != header::CONTENT_LENGTH && !rendered.headers().contains_key(name) {
            rendered.headers_mut().insert(name.clone(), value.clone());
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::error::StoreError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_queued_error_is_rendered() {
        let app = Router::new()
            .route(
                "/",
                get(|| async { queue(StoreError::Constraint("name exists".into()).into()) }),
            )
            .layer(axum::middleware::from_fn(erroring));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": 409, "statusText": "Conflict", "message": "name exists"})
        );
    }

    #[tokio::test]
    async fn test_private_error_is_muted() {
        let app = Router::new()
            .route(
                "/",
                get(|| async { queue(ApiError::private(StoreError::NotFound("secret".into()))) }),
            )
            .layer(axum::middleware::from_fn(erroring));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": 404, "statusText": "Not Found"})
        );
    }

    #[tokio::test]
    async fn test_wrapped_private_error_is_muted() {
        let app = Router::new()
            .route(
                "/",
                get(|| async {
                    let cause = ApiError::private(StoreError::Constraint("password=hunter2".into()));
                    queue(ApiError::wrap(cause, "saving"))
                }),
            )
            .layer(axum::middleware::from_fn(erroring));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"status": 409, "statusText": "Conflict"})
        );
    }

    #[tokio::test]
    async fn test_plain_responses_pass_through() {
        let app = Router::new()
            .route("/", get(|| async { (StatusCode::IM_A_TEAPOT, "tea") }))
            .layer(axum::middleware::from_fn(erroring));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
