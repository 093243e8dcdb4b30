//! Route reflection.
//!
//! Turns a handler's method set into route descriptors.
//!
//! # Naming Rules (resource handlers)
//! ```text
//! Create              POST    /ps/:p/rs
//! Get                 GET     /ps/:p/rs/:r
//! Update              PUT     /ps/:p/rs/:r
//! Delete              DELETE  /ps/:p/rs/:r
//! CollectionCreate    POST    /ps/:p/rs/_/batch
//! CollectionGet       GET     /ps/:p/rs
//! CollectionUpdate    PUT     /ps/:p/rs
//! CollectionDelete    DELETE  /ps/:p/rs
//! Route<X>            <tag>   /ps/:p/rs/:r/<tag path>
//! CollectionRoute<X>  <tag>   /ps/:p/rs/_/<tag path>
//! ```
//! Handlers without a kind expose only tagged methods, at the tag's path.
//!
//! # Design Decisions
//! - A method that breaks a rule is logged and skipped; the rest of the
//!   handler still registers
//! - Routes are ordered standard before custom, singular before
//!   collection, then POST < GET < PUT < DELETE, then by path; sub-resource
//!   routes follow their parent's
//! - Cycles in the sub-resource graph are detected per root-to-leaf path

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::Method;
use thiserror::Error;
use tracing::{error, warn};

use super::advice::AdviceProvider;
use super::handler::{ErasedMethod, Handler, MethodEntry, MethodSet};
use super::profile::{ResourceProfile, RouteProfile};
use super::route::{RequestAttributes, ResponseAttributes, Route};

const STANDARD_NAMES: [&str; 8] = [
    "Create",
    "Get",
    "Update",
    "Delete",
    "CollectionCreate",
    "CollectionGet",
    "CollectionUpdate",
    "CollectionDelete",
];

const ROUTE_PREFIX: &str = "Route";
const COLLECTION_PREFIX: &str = "Collection";
const COLLECTION_ROUTE_PREFIX: &str = "CollectionRoute";

/// Why a method did not become a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid custom route profile")]
    MissingRouteTag,

    #[error("invalid custom route profile: illegal path {0:?}")]
    IllegalPath(String),

    #[error("invalid {0} route func input parameter: cannot serve stream request")]
    StreamOnNonGet(String),

    #[error("invalid get route func input parameter: cannot serve two kinds of stream requests at once")]
    BothStreams,

    #[error("invalid get route func input parameter: cannot serve bidi stream request in standard route, try custom route instead")]
    BidiOnStandard,

    #[error("invalid {0} route func output parameter quantity")]
    OutputArity(String),
}

/// Where a method routes to, before its signature is checked.
struct Placement {
    method: Method,
    path: String,
    collection: bool,
    custom: bool,
    custom_name: String,
}

/// Reflect `handler` and its sub-resource handlers into routes.
///
/// `providers` are the router's advice providers; each route records the
/// indices of those its request type accepts.
pub fn reflect(handler: Arc<dyn Handler>, providers: &[Arc<dyn AdviceProvider>]) -> Vec<Route> {
    let mut visited = HashSet::new();
    reflect_handler(&ResourceProfile::default(), handler, providers, &mut visited)
}

fn reflect_handler(
    parent: &ResourceProfile,
    handler: Arc<dyn Handler>,
    providers: &[Arc<dyn AdviceProvider>],
    visited: &mut HashSet<&'static str>,
) -> Vec<Route> {
    let handler_type = handler.type_name();
    if !visited.insert(handler_type) {
        error!(handler = handler_type, "circular dependency resource handler detected");
        return Vec::new();
    }

    let resource = handler.kind().map(|kind| {
        ResourceProfile::of(kind, handler.alias_kind(), handler.internal_kind()).prepend(parent)
    });

    let mut set = MethodSet::new();
    Arc::clone(&handler).methods(&mut set);

    let mut routes = Vec::new();
    for MethodEntry { name, method } in set.into_entries() {
        let placement = match place(resource.as_ref(), &name, &*method) {
            Ok(Some(placement)) => placement,
            Ok(None) => continue,
            Err(rejection) => {
                warn!(handler = handler_type, func = %name, "{}", rejection);
                continue;
            }
        };

        match build(
            resource.clone().unwrap_or_default(),
            placement,
            handler_type,
            name.clone(),
            method,
            providers,
        ) {
            Ok(route) => routes.push(route),
            Err(rejection) => warn!(handler = handler_type, func = %name, "{}", rejection),
        }
    }

    routes.sort_by(|a, b| {
        let (a, b) = (&a.profile, &b.profile);
        a.custom
            .cmp(&b.custom)
            .then(a.collection.cmp(&b.collection))
            .then(method_rank(&a.method).cmp(&method_rank(&b.method)))
            .then_with(|| a.path.cmp(&b.path))
    });

    if let Some(resource) = &resource {
        for sub in handler.sub_resource_handlers() {
            for mut route in reflect_handler(resource, sub, providers, visited) {
                route.profile.sub = true;
                routes.push(route);
            }
        }
    }

    visited.remove(handler_type);
    routes
}

fn method_rank(method: &Method) -> u8 {
    match *method {
        Method::POST => 0,
        Method::GET => 1,
        Method::PUT => 2,
        _ => 3,
    }
}

/// Resolve method, path and flags from the method name and route tag.
/// `Ok(None)` means the name is not a route on a resource handler.
fn place(
    resource: Option<&ResourceProfile>,
    name: &str,
    method: &dyn ErasedMethod,
) -> Result<Option<Placement>, Rejection> {
    let tag = method.signature().route_tag;

    let Some(resource) = resource else {
        let (verb, path) = tag.and_then(parse_route_tag).ok_or(Rejection::MissingRouteTag)?;
        if matches!(path.as_str(), "/" | "/batch" | "/_" | "/_/batch") {
            return Err(Rejection::IllegalPath(path));
        }
        return Ok(Some(Placement {
            method: verb,
            path,
            collection: false,
            custom: true,
            custom_name: name.to_string(),
        }));
    };

    let singular = resource.singular_path();
    let plural = resource.plural_path();

    if STANDARD_NAMES.contains(&name) {
        let verb = if name.ends_with("Create") {
            Method::POST
        } else if name.ends_with("Get") {
            Method::GET
        } else if name.ends_with("Update") {
            Method::PUT
        } else {
            Method::DELETE
        };

        let (path, collection) = if name == "Create" {
            (plural, false)
        } else if !name.starts_with(COLLECTION_PREFIX) {
            (singular, false)
        } else if name == "CollectionCreate" {
            (join_path(&[&plural, "/_/batch"]), true)
        } else {
            (plural, true)
        };

        return Ok(Some(Placement {
            method: verb,
            path,
            collection,
            custom: false,
            custom_name: String::new(),
        }));
    }

    if let Some(custom_name) = name
        .strip_prefix(COLLECTION_ROUTE_PREFIX)
        .filter(|rest| !rest.is_empty())
    {
        let (verb, sub) = tag.and_then(parse_route_tag).ok_or(Rejection::MissingRouteTag)?;
        if matches!(sub.as_str(), "/" | "/batch") {
            return Err(Rejection::IllegalPath(sub));
        }
        return Ok(Some(Placement {
            method: verb,
            path: join_path(&[&plural, "_", &sub]),
            collection: true,
            custom: true,
            custom_name: custom_name.to_string(),
        }));
    }

    if let Some(custom_name) = name.strip_prefix(ROUTE_PREFIX).filter(|rest| !rest.is_empty()) {
        let (verb, sub) = tag.and_then(parse_route_tag).ok_or(Rejection::MissingRouteTag)?;
        if matches!(sub.as_str(), "/" | "/_/batch") {
            return Err(Rejection::IllegalPath(sub));
        }
        return Ok(Some(Placement {
            method: verb,
            path: join_path(&[&singular, &sub]),
            collection: false,
            custom: true,
            custom_name: custom_name.to_string(),
        }));
    }

    Ok(None)
}

/// Check the method's input and output against its placement.
fn build(
    resource: ResourceProfile,
    placement: Placement,
    handler_type: &'static str,
    handler_func: String,
    method: Arc<dyn ErasedMethod>,
    providers: &[Arc<dyn AdviceProvider>],
) -> Result<Route, Rejection> {
    let signature = method.signature();
    let request_attributes =
        RequestAttributes::from_parts(signature.capabilities, signature.categories);
    let verb = placement.method.as_str().to_lowercase();

    if placement.method != Method::GET && request_attributes.has_stream() {
        return Err(Rejection::StreamOnNonGet(verb));
    }
    if request_attributes.unidi_stream && request_attributes.bidi_stream {
        return Err(Rejection::BothStreams);
    }
    if !placement.custom && request_attributes.bidi_stream {
        return Err(Rejection::BidiOnStandard);
    }

    let arity = signature.arity;
    let valid = (1..=3).contains(&arity)
        && match placement.method {
            Method::POST => {
                if placement.custom {
                    arity <= 2
                } else {
                    arity == 2
                }
            }
            Method::GET => {
                if placement.custom {
                    arity >= 1
                } else if placement.collection {
                    arity == 3
                } else {
                    arity == 2
                }
            }
            _ => {
                if placement.custom {
                    arity <= 2
                } else {
                    arity == 1
                }
            }
        };
    if !valid {
        return Err(Rejection::OutputArity(verb));
    }

    let advice_providers = providers
        .iter()
        .enumerate()
        .filter(|(_, p)| method.accepts_advice(p.as_ref()))
        .map(|(i, _)| i)
        .collect();

    let mut profile = RouteProfile::new(resource, placement.method, placement.path);
    profile.collection = placement.collection;
    profile.custom = placement.custom;
    profile.custom_name = placement.custom_name;
    profile.describe();

    Ok(Route {
        profile,
        handler_type,
        handler_func,
        request_type: signature.request_type,
        response_type: signature.response_type,
        request_attributes,
        response_attributes: ResponseAttributes { page: arity == 3 },
        parameters: signature.parameters,
        advice_providers,
        method,
    })
}

/// Parse `METHOD=path`; the path is cleaned and rooted.
pub fn parse_route_tag(tag: &str) -> Option<(Method, String)> {
    let (method, path) = tag.split_once('=')?;
    let method = match method.trim().to_ascii_uppercase().as_str() {
        "POST" => Method::POST,
        "DELETE" => Method::DELETE,
        "PUT" => Method::PUT,
        "GET" => Method::GET,
        _ => return None,
    };
    Some((method, clean_path(path.trim())))
}

/// Lexically clean a path, rooted at `/`.
pub fn clean_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    format!("/{}", stack.join("/"))
}

/// Join path elements and clean the result.
pub fn join_path(parts: &[&str]) -> String {
    clean_path(&parts.join("/"))
}
