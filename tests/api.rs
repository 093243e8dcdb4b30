//! REST dispatch through the full middleware stack, in process.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{app, DENY_HEADER};
use walrus_apiserver::http::X_REQUEST_ID;
use walrus_apiserver::ApiConfig;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn with_body(method: Method, uri: &str, content_type: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    with_body(method, uri, "application/json", body.to_string())
}

#[tokio::test]
async fn test_get_resource() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects/p3")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "p3");
    assert_eq!(body["name"], "project-3");
}

#[tokio::test]
async fn test_get_missing_resource_is_not_found() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["statusText"], "Not Found");
    assert_eq!(body["message"], "project not found");
}

#[tokio::test]
async fn test_collection_page_envelope() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects?page=2&perPage=10")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 10);
    assert_eq!(body["items"][0]["id"], "p11");
    assert_eq!(
        body["pagination"],
        json!({
            "page": 2,
            "perPage": 10,
            "total": 37,
            "totalPage": 4,
            "partial": true,
            "nextPage": 3,
        })
    );
}

#[tokio::test]
async fn test_collection_last_page_has_no_next() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects?page=4&perPage=10")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 7);
    assert_eq!(body["pagination"]["nextPage"], 0);
}

#[tokio::test]
async fn test_collection_page_beyond_range() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects?page=9223372036854775807&perPage=10")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["pagination"]["page"], i64::MAX);
    assert_eq!(body["pagination"]["totalPage"], 4);
    assert_eq!(body["pagination"]["nextPage"], 0);
}

#[tokio::test]
async fn test_collection_query_filters() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects?query=project-3")).await;

    assert_eq!(status, StatusCode::OK);
    // project-3 and project-30..37
    assert_eq!(body["pagination"]["total"], 9);
}

#[tokio::test]
async fn test_collection_rejects_blank_query() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects?query=%20%20")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "blank query value is not allowed");
}

#[tokio::test]
async fn test_create_returns_created() {
    let app = app(ApiConfig::default());
    let request = json_request(
        Method::POST,
        "/v1/projects",
        json!({"name": "fresh", "description": "new one"}),
    );
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "fresh");
    assert_eq!(body["description"], "new one");

    let id = body["id"].as_str().unwrap().to_string();
    let (status, _, body) = send(&app, get(&format!("/v1/projects/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "fresh");
}

#[tokio::test]
async fn test_create_conflict() {
    let app = app(ApiConfig::default());
    let request = json_request(Method::POST, "/v1/projects", json!({"name": "project-1"}));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body,
        json!({
            "status": 409,
            "statusText": "Conflict",
            "message": "failed to create project: name exists",
        })
    );
}

#[tokio::test]
async fn test_create_validation_failure() {
    let app = app(ApiConfig::default());
    let request = json_request(Method::POST, "/v1/projects", json!({"name": "   "}));
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid name: blank");
}

#[tokio::test]
async fn test_create_unsupported_media_type() {
    let app = app(ApiConfig::default());
    let request = with_body(Method::POST, "/v1/projects", "text/plain", "name=x".into());
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["status"], 415);
}

#[tokio::test]
async fn test_delete_returns_accepted() {
    let app = app(ApiConfig::default());
    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/v1/projects/p5")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);

    let (status, _, _) = send(&app, get("/v1/projects/p5")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_route_binds_header_and_advice() {
    let app = app(ApiConfig::default());
    let request = Request::builder()
        .uri("/v1/projects/p2/inspect")
        .header("x-trace", "abc")
        .header(X_REQUEST_ID, "req-42")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"], "p2");
    assert_eq!(body["trace"], "abc");
    assert_eq!(body["requestId"], "req-42");
    assert_eq!(body["context"], true);
    assert_eq!(headers.get(X_REQUEST_ID).unwrap(), "req-42");
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let app = app(ApiConfig::default());
    let (status, headers, body) = send(&app, get("/v1/projects/p2/inspect")).await;

    assert_eq!(status, StatusCode::OK);
    let generated = headers.get(X_REQUEST_ID).unwrap().to_str().unwrap();
    assert!(!generated.is_empty());
    assert_eq!(body["requestId"], generated);
    assert_eq!(body["trace"], Value::Null);
}

#[tokio::test]
async fn test_custom_put_binds_form() {
    let app = app(ApiConfig::default());
    let request = with_body(
        Method::PUT,
        "/v1/projects/p7/rename",
        "application/x-www-form-urlencoded",
        "name=renamed".into(),
    );
    let (status, _, body) = send(&app, request).await;

    // Custom routes keep 200 regardless of method.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "p7");
    assert_eq!(body["name"], "renamed");
}

#[tokio::test]
async fn test_form_route_rejects_json() {
    let app = app(ApiConfig::default());
    let request = json_request(Method::PUT, "/v1/projects/p7/rename", json!({"name": "x"}));
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_stream_request_on_plain_route() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/projects/p1?watch=true")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "stream request is not supported by this route");
}

#[tokio::test]
async fn test_authorizer_rejects() {
    let app = app(ApiConfig::default());
    let request = Request::builder()
        .uri("/v1/projects/p1")
        .header(DENY_HEADER, "1")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"status": 403, "statusText": "Forbidden"}));
}

#[tokio::test]
async fn test_unknown_path_envelope() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/nowhere")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"status": 404, "statusText": "Not Found"}));
}

#[tokio::test]
async fn test_wrong_method_envelope() {
    let app = app(ApiConfig::default());
    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/v1/projects")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["statusText"], "Method Not Allowed");
}

#[tokio::test]
async fn test_catalog_lists_routes() {
    let app = app(ApiConfig::default());
    let (status, _, body) = send(&app, get("/v1/routes")).await;

    assert_eq!(status, StatusCode::OK);
    let routes = body.as_array().unwrap();
    let find = |method: &str, path: &str| {
        routes
            .iter()
            .find(|r| r["method"] == method && r["path"] == path)
            .cloned()
    };

    let get = find("GET", "/v1/projects/:project").unwrap();
    assert_eq!(get["summary"], "Get a project.");

    let list = find("GET", "/v1/projects").unwrap();
    assert_eq!(list["collection"], true);
    assert_eq!(list["responseAttributes"]["page"], true);
    assert_eq!(list["requestAttributes"]["unidiStream"], true);

    let exec = find("GET", "/v1/projects/:project/exec").unwrap();
    assert_eq!(exec["custom"], true);
    assert_eq!(exec["requestAttributes"]["bidiStream"], true);

    assert!(find("PUT", "/v1/projects/:project/rename").is_some());
    assert!(find("DELETE", "/v1/projects/:project").is_some());
}
