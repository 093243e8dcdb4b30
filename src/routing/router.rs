//! Route registration.
//!
//! # Responsibilities
//! - Reflect handlers and register one axum route per descriptor
//! - Register plain axum handlers (`get`, `post`, ...) under groups
//! - Refuse duplicate (method, path) pairs with a log line, not a panic;
//!   paths compare by template, so `/a/:x` and `/a/:y` are the same path
//! - Serve the route catalog and the 404/405 envelopes
//! - Install the error-normalizing and request metrics layers
//!
//! # Design Decisions
//! - The advice provider list and authorizer are fixed when the router is
//!   created; reflected routes keep indices into that list
//! - Immutable after `into_axum` (thread-safe without locks)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use axum::extract::Request as HttpRequest;
use axum::handler::Handler as AxumHandler;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Json;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::ApiError;
use crate::http::dispatch::{RouteState, Runtime};
use crate::http::middleware::{erroring, observing, queue};
use crate::http::stream::SessionTracker;

use super::advice::{AdviceProvider, RequestIdAdvice};
use super::authorize::{AllowAll, Authorizer};
use super::handler::Handler;
use super::reflect::{join_path, reflect};
use super::route::Route;

/// Construction options of an `ApiRouter`.
pub struct RouterOptions {
    pub authorizer: Arc<dyn Authorizer>,
    pub advice: Vec<Arc<dyn AdviceProvider>>,
    pub stream: StreamConfig,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            authorizer: Arc::new(AllowAll),
            advice: vec![Arc::new(RequestIdAdvice)],
            stream: StreamConfig::default(),
        }
    }
}

#[derive(Default)]
struct Registry {
    seen: HashSet<(Method, String)>,
    /// Template prefix ending at a parameter → that parameter's segment.
    params: HashMap<String, String>,
    paths: BTreeMap<String, MethodRouter>,
    routes: Vec<Route>,
    catalogs: Vec<String>,
}

impl Registry {
    fn claim(&mut self, method: &Method, path: &str) -> bool {
        let params = parameters(path);
        for (prefix, segment) in &params {
            match self.params.get(prefix) {
                Some(registered) if registered != segment => {
                    warn!(
                        method = %method,
                        path = %path,
                        registered = %registered,
                        "route parameter clashes with a registered route, skipped"
                    );
                    return false;
                }
                _ => {}
            }
        }
        if !self.seen.insert((method.clone(), path_template(path))) {
            warn!(method = %method, path = %path, "duplicate route, skipped");
            return false;
        }
        for (prefix, segment) in params {
            self.params.entry(prefix).or_insert_with(|| segment.to_string());
        }
        true
    }

    fn insert(&mut self, path: String, method_router: MethodRouter) {
        let merged = match self.paths.remove(&path) {
            Some(existing) => existing.merge(method_router),
            None => method_router,
        };
        self.paths.insert(path, merged);
    }
}

/// Router of reflected and plain routes.
pub struct ApiRouter {
    runtime: Arc<Runtime>,
    registry: Registry,
}

impl Default for ApiRouter {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}

impl ApiRouter {
    pub fn new(options: RouterOptions) -> Self {
        Self {
            runtime: Arc::new(Runtime {
                authorizer: options.authorizer,
                advice: options.advice,
                stream: options.stream,
                sessions: Arc::new(SessionTracker::new()),
            }),
            registry: Registry::default(),
        }
    }

    /// Stream session tracker shared by all routes of this router.
    pub fn sessions(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.runtime.sessions)
    }

    /// Registration surface rooted at `relative_path`.
    pub fn group(&mut self, relative_path: &str) -> Group<'_> {
        Group {
            base: join_path(&[relative_path]),
            router: self,
        }
    }

    /// Run `f` against a group and return the router.
    pub fn group_in(&mut self, relative_path: &str, f: impl FnOnce(&mut Group<'_>)) -> &mut Self {
        f(&mut self.group(relative_path));
        self
    }

    pub fn routes(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        self.group("/").routes(handler);
        self
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.group("/").get(path, handler);
        self
    }

    pub fn catalog(&mut self, path: &str) -> &mut Self {
        self.group("/").catalog(path);
        self
    }

    /// Every registered descriptor, paths including their group base.
    pub fn registered(&self) -> &[Route] {
        &self.registry.routes
    }

    /// Build the axum router.
    pub fn into_axum(self) -> axum::Router {
        let ApiRouter { mut registry, .. } = self;

        let catalog: Arc<Vec<Route>> = Arc::new(registry.routes.clone());
        for path in std::mem::take(&mut registry.catalogs) {
            let catalog = Arc::clone(&catalog);
            registry.insert(
                to_axum_path(&path),
                on(MethodFilter::GET, move || {
                    let catalog = Arc::clone(&catalog);
                    async move { Json(catalog.as_ref().clone()) }
                }),
            );
        }

        let observed = !registry.paths.is_empty();
        let mut router = axum::Router::new();
        for (path, method_router) in registry.paths {
            router = router.route(&path, method_router);
        }
        if observed {
            router = router.route_layer(axum::middleware::from_fn(observing));
        }

        router
            .fallback(no_route)
            .method_not_allowed_fallback(no_method)
            .layer(axum::middleware::from_fn(erroring))
    }
}

/// Routes registered under a common base path.
pub struct Group<'a> {
    base: String,
    router: &'a mut ApiRouter,
}

impl Group<'_> {
    pub fn relative_path(&self) -> &str {
        &self.base
    }

    /// Nested group; `relative_path` is appended to this group's base.
    pub fn group(&mut self, relative_path: &str) -> Group<'_> {
        Group {
            base: join_path(&[&self.base, relative_path]),
            router: &mut *self.router,
        }
    }

    pub fn group_in(&mut self, relative_path: &str, f: impl FnOnce(&mut Group<'_>)) -> &mut Self {
        f(&mut self.group(relative_path));
        self
    }

    /// Reflect `handler` and register its routes.
    pub fn routes(&mut self, handler: Arc<dyn Handler>) -> &mut Self {
        let runtime = Arc::clone(&self.router.runtime);
        let registry = &mut self.router.registry;

        for mut route in reflect(handler, &runtime.advice) {
            let path = join_path(&[&self.base, &route.profile.path]);
            let axum_path = to_axum_path(&path);
            if !registry.claim(&route.profile.method, &axum_path) {
                continue;
            }
            route.profile.path = path;

            debug!(
                method = %route.profile.method,
                path = %route.profile.path,
                handler = route.handler_type,
                func = %route.handler_func,
                "route registered"
            );

            let filter = match MethodFilter::try_from(route.profile.method.clone()) {
                Ok(filter) => filter,
                Err(_) => continue,
            };
            let state = Arc::new(RouteState {
                route: route.clone(),
                runtime: Arc::clone(&runtime),
            });
            let serve = move |request: HttpRequest| {
                let state = Arc::clone(&state);
                async move {
                    let method = Arc::clone(&state.route.method);
                    method.call(state, request).await
                }
            };

            registry.insert(axum_path, on(filter, serve));
            registry.routes.push(route);
        }
        self
    }

    pub fn get<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.handle(Method::GET, path, handler)
    }

    pub fn post<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.handle(Method::POST, path, handler)
    }

    pub fn put<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete<H, T>(&mut self, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        self.handle(Method::DELETE, path, handler)
    }

    /// Serve the route catalog at `path`.
    pub fn catalog(&mut self, path: &str) -> &mut Self {
        let path = join_path(&[&self.base, path]);
        if self.router.registry.claim(&Method::GET, &to_axum_path(&path)) {
            self.router.registry.catalogs.push(path);
        }
        self
    }

    fn handle<H, T>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: AxumHandler<T, ()>,
        T: 'static,
    {
        let path = to_axum_path(&join_path(&[&self.base, path]));
        let registry = &mut self.router.registry;
        if !registry.claim(&method, &path) {
            return self;
        }
        if let Ok(filter) = MethodFilter::try_from(method) {
            registry.insert(path, on(filter, handler));
        }
        self
    }
}

/// `/projects/:project` → `/projects/{project}`.
pub fn to_axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn template_segment(segment: &str) -> &str {
    if segment.starts_with("{*") {
        "{*}"
    } else if segment.starts_with('{') {
        "{}"
    } else {
        segment
    }
}

/// `/projects/{project}` → `/projects/{}`; catch-alls become `{*}`.
fn path_template(path: &str) -> String {
    path.split('/')
        .map(template_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// `(template prefix, segment)` for each parameter of `path`.
///
/// The router rejects two names for one parameter position, so the prefix
/// is the key that must agree across registered paths.
fn parameters(path: &str) -> Vec<(String, &str)> {
    let segments: Vec<&str> = path.split('/').collect();
    segments
        .iter()
        .enumerate()
        .filter(|(_, segment)| segment.starts_with('{'))
        .map(|(i, segment)| {
            let prefix = segments[..=i]
                .iter()
                .map(|s| template_segment(s))
                .collect::<Vec<_>>()
                .join("/");
            (prefix, *segment)
        })
        .collect()
}

async fn no_route(request: HttpRequest) -> Response {
    debug!(path = %request.uri().path(), "no route");
    queue(ApiError::bare(StatusCode::NOT_FOUND))
}

async fn no_method() -> Response {
    queue(ApiError::bare(StatusCode::METHOD_NOT_ALLOWED))
}
