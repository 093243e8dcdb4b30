//! Shared fixtures for integration tests.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use walrus_apiserver::bind::{Bind, Schema};
use walrus_apiserver::config::ApiConfig;
use walrus_apiserver::error::{StoreError, ValidationError};
use walrus_apiserver::http::stream::SessionTracker;
use walrus_apiserver::http::{
    BidiStream, RequestCollection, RequestContext, StreamError, TypedResponse, UnidiStream,
};
use walrus_apiserver::lifecycle::Shutdown;
use walrus_apiserver::routing::{
    ApiRouter, AuthorizeFn, Capabilities, Handler, MethodSet, Request, RequestIdAdvice,
    RouteProfile, RouterOptions,
};
use walrus_apiserver::{methods, ApiError, HttpServer};

/// Requests carrying this header are refused by the test authorizer.
#[allow(dead_code)]
pub const DENY_HEADER: &str = "x-deny";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
}

impl Bind for CreateProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("name", r#"json:"name""#, |r| &mut r.name)
            .field("description", r#"json:"description,omitempty""#, |r| &mut r.description);
    }
}

impl Request for CreateProjectRequest {
    const CAPABILITIES: Capabilities = Capabilities::NONE.validate();

    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err("invalid name: blank".into());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct GetProjectRequest {
    pub id: String,
}

impl Bind for GetProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("id", r#"path:"project""#, |r| &mut r.id);
    }
}

impl Request for GetProjectRequest {}

#[derive(Debug, Default)]
pub struct DeleteProjectRequest {
    pub id: String,
}

impl Bind for DeleteProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("id", r#"path:"project""#, |r| &mut r.id);
    }
}

impl Request for DeleteProjectRequest {}

#[derive(Debug, Default)]
pub struct CollectionGetProjectsRequest {
    pub collection: RequestCollection,
    pub stream: Option<UnidiStream>,
}

impl Bind for CollectionGetProjectsRequest {
    fn schema(s: &mut Schema<Self>) {
        s.inline("collection", r#"query:",inline""#, |r| &mut r.collection);
    }
}

impl Request for CollectionGetProjectsRequest {
    const CAPABILITIES: Capabilities = Capabilities::NONE.validate().unidi_stream();

    fn validate(&self) -> Result<(), ValidationError> {
        self.collection.validate()
    }

    fn set_unidi_stream(&mut self, stream: UnidiStream) {
        self.stream = Some(stream);
    }
}

#[derive(Debug, Default)]
pub struct InspectProjectRequest {
    pub id: String,
    pub trace: Option<String>,
    pub request_id: String,
    pub ctx: Option<RequestContext>,
}

impl Bind for InspectProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("id", r#"path:"project""#, |r| &mut r.id)
            .field("trace", r#"header:"X-Trace""#, |r| &mut r.trace);
    }
}

impl Request for InspectProjectRequest {
    const ROUTE: Option<&'static str> = Some("GET=/inspect");
    const CAPABILITIES: Capabilities = Capabilities::NONE.context();

    fn set_context(&mut self, ctx: RequestContext) {
        self.ctx = Some(ctx);
    }

    fn accepts_advice(&self, advice: &str) -> bool {
        advice == RequestIdAdvice::NAME
    }

    fn receive_advice(&mut self, advice: &str, value: Box<dyn Any + Send>) {
        if advice == RequestIdAdvice::NAME {
            if let Ok(id) = value.downcast::<String>() {
                self.request_id = *id;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RenameProjectRequest {
    pub id: String,
    pub name: String,
}

impl Bind for RenameProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("id", r#"path:"project""#, |r| &mut r.id)
            .field("name", r#"form:"name""#, |r| &mut r.name);
    }
}

impl Request for RenameProjectRequest {
    const ROUTE: Option<&'static str> = Some("PUT=/rename");
}

#[derive(Default)]
pub struct ExecProjectRequest {
    pub id: String,
    pub stream: Option<BidiStream>,
}

impl Bind for ExecProjectRequest {
    fn schema(s: &mut Schema<Self>) {
        s.field("id", r#"path:"project""#, |r| &mut r.id);
    }
}

impl Request for ExecProjectRequest {
    const ROUTE: Option<&'static str> = Some("GET=/exec");
    const CAPABILITIES: Capabilities = Capabilities::NONE.bidi_stream();

    fn set_bidi_stream(&mut self, stream: BidiStream) {
        self.stream = Some(stream);
    }
}

/// In-memory project resource.
pub struct Projects {
    store: RwLock<Vec<Project>>,
}

impl Projects {
    /// `count` projects named `project-1`, `project-2`, ...
    pub fn seeded(count: usize) -> Self {
        let projects = (1..=count)
            .map(|i| Project {
                id: format!("p{}", i),
                name: format!("project-{}", i),
                description: String::new(),
            })
            .collect();
        Self {
            store: RwLock::new(projects),
        }
    }

    async fn create(&self, req: CreateProjectRequest) -> Result<Json<Project>, ApiError> {
        let mut store = self.store.write().await;
        if store.iter().any(|p| p.name == req.name) {
            return Err(ApiError::wrap(
                StoreError::Constraint("name exists".into()),
                "failed to create project",
            ));
        }
        let project = Project {
            id: format!("p{}", store.len() + 1),
            name: req.name,
            description: req.description,
        };
        store.push(project.clone());
        Ok(Json(project))
    }

    async fn get(&self, req: GetProjectRequest) -> Result<Json<Project>, ApiError> {
        let store = self.store.read().await;
        store
            .iter()
            .find(|p| p.id == req.id)
            .cloned()
            .map(Json)
            .ok_or_else(|| StoreError::NotFound("project".into()).into())
    }

    async fn delete(&self, req: DeleteProjectRequest) -> Result<(), ApiError> {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|p| p.id != req.id);
        if store.len() == before {
            return Err(StoreError::NotFound("project".into()).into());
        }
        Ok(())
    }

    async fn collection_get(
        &self,
        req: CollectionGetProjectsRequest,
    ) -> Result<(Json<Vec<Project>>, usize), ApiError> {
        let store = self.store.read().await;
        let mut items: Vec<Project> = match &req.collection.querying.query {
            Some(q) => {
                let q = q.to_lowercase();
                store
                    .iter()
                    .filter(|p| p.name.to_lowercase().contains(&q))
                    .cloned()
                    .collect()
            }
            None => store.clone(),
        };
        drop(store);

        let total = items.len();
        if let Some((limit, offset)) = req.collection.pagination.paging() {
            items = items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
        }

        if let Some(stream) = &req.stream {
            stream.send_json(&TypedResponse::created(items)).await?;
            return Ok((Json(Vec::new()), 0));
        }
        Ok((Json(items), total))
    }

    async fn route_inspect(
        &self,
        req: InspectProjectRequest,
    ) -> Result<Json<serde_json::Value>, ApiError> {
        Ok(Json(serde_json::json!({
            "project": req.id,
            "trace": req.trace,
            "requestId": req.request_id,
            "context": req.ctx.is_some(),
        })))
    }

    async fn route_rename(&self, req: RenameProjectRequest) -> Result<Json<Project>, ApiError> {
        let mut store = self.store.write().await;
        let project = store
            .iter_mut()
            .find(|p| p.id == req.id)
            .ok_or_else(|| StoreError::NotFound("project".into()))?;
        project.name = req.name;
        Ok(Json(project.clone()))
    }

    /// Echoes text frames; `quit` closes with 4000, `fail` with 1011.
    async fn route_exec(&self, req: ExecProjectRequest) -> Result<(), ApiError> {
        let Some(stream) = req.stream else {
            return Err(ApiError::http(StatusCode::BAD_REQUEST, "websocket required"));
        };
        loop {
            let frame = stream.recv().await?;
            let text = String::from_utf8_lossy(&frame).into_owned();
            match text.as_str() {
                "exit" => return Ok(()),
                "quit" => {
                    return Err(StreamError::Closed {
                        code: 4000,
                        reason: "bye".into(),
                    }
                    .into())
                }
                "fail" => return Err(ApiError::other("boom")),
                _ => stream.send_text(format!("{}: {}", req.id, text)).await?,
            }
        }
    }
}

impl Handler for Projects {
    fn kind(&self) -> Option<&str> {
        Some("Project")
    }

    fn methods(self: Arc<Self>, set: &mut MethodSet) {
        methods!(self, set, {
            "Create" => create,
            "Get" => get,
            "Delete" => delete,
            "CollectionGet" => collection_get,
            "RouteInspect" => route_inspect,
            "RouteRename" => route_rename,
            "RouteExec" => route_exec,
        });
    }
}

/// Router with 37 seeded projects under `/v1`, plus the catalog.
pub fn api_router(config: &ApiConfig) -> ApiRouter {
    let authorizer = AuthorizeFn::new(|parts: Parts, _profile: RouteProfile| async move {
        if parts.headers.contains_key(DENY_HEADER) {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::OK
        }
    });

    let mut router = ApiRouter::new(RouterOptions {
        authorizer,
        stream: config.stream.clone(),
        ..Default::default()
    });
    router.group_in(&config.api.base_path, |v1| {
        v1.routes(Arc::new(Projects::seeded(37)));
        v1.catalog("/routes");
    });
    router
}

/// A server running on an ephemeral port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub sessions: Arc<SessionTracker>,
    shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start the fixture API on 127.0.0.1 with an ephemeral port.
#[allow(dead_code)]
pub async fn spawn_server(config: ApiConfig) -> TestServer {
    let router = api_router(&config);
    let sessions = router.sessions();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, router);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        addr,
        sessions,
        shutdown,
    }
}

/// In-process router with the full middleware stack.
#[allow(dead_code)]
pub fn app(config: ApiConfig) -> axum::Router {
    let router = api_router(&config);
    HttpServer::new(config, router).into_router()
}
