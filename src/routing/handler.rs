//! Handler contract.
//!
//! # Responsibilities
//! - Define what an API handler exposes (`Handler`): an optional resource
//!   kind, sub-resource handlers, and a named set of methods
//! - Define what a method's input may be capable of (`Request`) and how
//!   its output is rendered (`Outcome`)
//! - Erase typed methods so the reflector and dispatcher can treat them
//!   uniformly (`MethodSet`)
//!
//! # Example
//! ```ignore
//! struct Projects { store: Store }
//!
//! impl Handler for Projects {
//!     fn kind(&self) -> Option<&str> { Some("Project") }
//!
//!     fn methods(self: Arc<Self>, set: &mut MethodSet) {
//!         methods!(self, set, {
//!             "Create" => create,
//!             "Get" => get,
//!             "CollectionGet" => collection_get,
//!         });
//!     }
//! }
//! ```
//!
//! # Design Decisions
//! - Method names carry the route semantics (`Create`, `CollectionGet`,
//!   `RouteExec`, ...), the request type carries its capabilities as
//!   associated constants, and the output type carries its arity
//! - A method is registered once; reflecting the same handler twice
//!   yields equal descriptors

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use axum::response::Response;
use axum::Json;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::bind::{Bind, Categories, Parameter};
use crate::error::{ApiError, ValidationError};
use crate::http::dispatch::{self, RouteState};
use crate::http::request::RequestContext;
use crate::http::stream::{BidiStream, UnidiStream};

use super::advice::AdviceProvider;

/// An API handler.
pub trait Handler: Send + Sync + 'static {
    /// Resource kind; handlers with a kind get resource routes.
    fn kind(&self) -> Option<&str> {
        None
    }

    /// Path segment override for the kind.
    fn alias_kind(&self) -> Option<&str> {
        None
    }

    /// Path parameter name override for the kind.
    fn internal_kind(&self) -> Option<&str> {
        None
    }

    /// Handlers nested under this resource.
    fn sub_resource_handlers(&self) -> Vec<Arc<dyn Handler>> {
        Vec::new()
    }

    /// Register the handler's methods.
    fn methods(self: Arc<Self>, set: &mut MethodSet);

    /// Identity used for cycle detection.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

struct Aliased {
    inner: Arc<dyn Handler>,
    alias: String,
}

impl Handler for Aliased {
    fn kind(&self) -> Option<&str> {
        self.inner.kind()
    }

    fn alias_kind(&self) -> Option<&str> {
        Some(&self.alias)
    }

    fn internal_kind(&self) -> Option<&str> {
        self.inner.internal_kind()
    }

    fn sub_resource_handlers(&self) -> Vec<Arc<dyn Handler>> {
        self.inner.sub_resource_handlers()
    }

    fn methods(self: Arc<Self>, set: &mut MethodSet) {
        Arc::clone(&self.inner).methods(set)
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }
}

/// Serve a resource handler under a different path segment.
pub fn alias(handler: Arc<dyn Handler>, kind: impl Into<String>) -> Arc<dyn Handler> {
    Arc::new(Aliased {
        inner: handler,
        alias: kind.into(),
    })
}

/// Optional abilities of a request type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub validate: bool,
    pub context: bool,
    pub unidi_stream: bool,
    pub bidi_stream: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        validate: false,
        context: false,
        unidi_stream: false,
        bidi_stream: false,
    };

    pub const fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    pub const fn context(mut self) -> Self {
        self.context = true;
        self
    }

    pub const fn unidi_stream(mut self) -> Self {
        self.unidi_stream = true;
        self
    }

    pub const fn bidi_stream(mut self) -> Self {
        self.bidi_stream = true;
        self
    }
}

/// Input of a handler method.
///
/// Hooks run only when the matching capability is declared in
/// `CAPABILITIES`.
pub trait Request: Bind + Default {
    /// `METHOD=path`, required on custom routes.
    const ROUTE: Option<&'static str> = None;

    const CAPABILITIES: Capabilities = Capabilities::NONE;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    fn set_context(&mut self, _ctx: RequestContext) {}

    fn set_unidi_stream(&mut self, _stream: UnidiStream) {}

    fn set_bidi_stream(&mut self, _stream: BidiStream) {}

    /// Whether the named advice is wanted.
    fn accepts_advice(&self, _advice: &str) -> bool {
        false
    }

    fn receive_advice(&mut self, _advice: &str, _value: Box<dyn Any + Send>) {}
}

/// Rendered form of a method's output.
pub enum Reply {
    Empty,
    Json(Value),
    Raw(Response),
    Page { items: Value, total: i64 },
}

/// Output of a handler method.
///
/// `ARITY` counts the error slot: `()` is 1, a body is 2, a body with a
/// total count is 3.
pub trait Outcome: Send + 'static {
    const ARITY: usize;

    fn type_name() -> Option<&'static str>;

    fn into_reply(self) -> Result<Reply, ApiError>;
}

impl Outcome for () {
    const ARITY: usize = 1;

    fn type_name() -> Option<&'static str> {
        None
    }

    fn into_reply(self) -> Result<Reply, ApiError> {
        Ok(Reply::Empty)
    }
}

impl<T: Serialize + Send + 'static> Outcome for Json<T> {
    const ARITY: usize = 2;

    fn type_name() -> Option<&'static str> {
        Some(std::any::type_name::<T>())
    }

    fn into_reply(self) -> Result<Reply, ApiError> {
        let value = serde_json::to_value(self.0).map_err(ApiError::private)?;
        Ok(Reply::Json(value))
    }
}

impl Outcome for Response {
    const ARITY: usize = 2;

    fn type_name() -> Option<&'static str> {
        Some(std::any::type_name::<Response>())
    }

    fn into_reply(self) -> Result<Reply, ApiError> {
        Ok(Reply::Raw(self))
    }
}

/// Integer total count of a paged output.
pub trait TotalCount: Send + 'static {
    fn total(self) -> i64;
}

macro_rules! total_count {
    ($($t:ty),*) => {
        $(
            impl TotalCount for $t {
                fn total(self) -> i64 {
                    i64::try_from(self).unwrap_or(i64::MAX)
                }
            }
        )*
    };
}

total_count!(i32, i64, u32, u64, usize);

impl<T, N> Outcome for (Json<T>, N)
where
    T: Serialize + Send + 'static,
    N: TotalCount,
{
    const ARITY: usize = 3;

    fn type_name() -> Option<&'static str> {
        Some(std::any::type_name::<T>())
    }

    fn into_reply(self) -> Result<Reply, ApiError> {
        let items = serde_json::to_value(self.0 .0).map_err(ApiError::private)?;
        Ok(Reply::Page {
            items,
            total: self.1.total(),
        })
    }
}

pub(crate) type MethodFn<R, O> =
    Arc<dyn Fn(R) -> BoxFuture<'static, Result<O, ApiError>> + Send + Sync>;

/// Static shape of a registered method.
pub(crate) struct Signature {
    pub request_type: &'static str,
    pub route_tag: Option<&'static str>,
    pub capabilities: Capabilities,
    pub categories: Categories,
    pub arity: usize,
    pub response_type: Option<&'static str>,
    pub parameters: Vec<Parameter>,
}

/// A method with its request and output types erased.
pub(crate) trait ErasedMethod: Send + Sync + 'static {
    fn signature(&self) -> Signature;

    fn accepts_advice(&self, provider: &dyn AdviceProvider) -> bool;

    fn call(
        &self,
        state: Arc<RouteState>,
        request: axum::extract::Request,
    ) -> BoxFuture<'static, Response>;
}

struct Typed<R, O> {
    call: MethodFn<R, O>,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R: Request, O: Outcome> ErasedMethod for Typed<R, O> {
    fn signature(&self) -> Signature {
        Signature {
            request_type: std::any::type_name::<R>(),
            route_tag: R::ROUTE,
            capabilities: R::CAPABILITIES,
            categories: R::categories(0),
            arity: O::ARITY,
            response_type: O::type_name(),
            parameters: R::parameters(0),
        }
    }

    fn accepts_advice(&self, provider: &dyn AdviceProvider) -> bool {
        provider.can_set(&R::default())
    }

    fn call(
        &self,
        state: Arc<RouteState>,
        request: axum::extract::Request,
    ) -> BoxFuture<'static, Response> {
        Box::pin(dispatch::serve::<R, O>(state, Arc::clone(&self.call), request))
    }
}

pub(crate) struct MethodEntry {
    pub name: String,
    pub method: Arc<dyn ErasedMethod>,
}

/// Named methods of a handler, in registration order.
#[derive(Default)]
pub struct MethodSet {
    entries: Vec<MethodEntry>,
}

impl MethodSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method under `name`.
    pub fn add<R, O, F, Fut>(&mut self, name: &str, f: F) -> &mut Self
    where
        R: Request,
        O: Outcome,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    {
        let call: MethodFn<R, O> = Arc::new(move |req| Box::pin(f(req)));
        self.entries.push(MethodEntry {
            name: name.to_string(),
            method: Arc::new(Typed {
                call,
                _marker: PhantomData,
            }),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<MethodEntry> {
        self.entries
    }
}

/// Register `async fn` methods of an `Arc`-held handler by name.
#[macro_export]
macro_rules! methods {
    ($handler:expr, $set:expr, { $($name:literal => $method:ident),* $(,)? }) => {{
        let set: &mut $crate::routing::MethodSet = $set;
        $(
            {
                let handler = ::std::sync::Arc::clone(&$handler);
                set.add($name, move |req| {
                    let handler = ::std::sync::Arc::clone(&handler);
                    async move { handler.$method(req).await }
                });
            }
        )*
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::Schema;

    #[derive(Default)]
    struct Empty;

    impl Bind for Empty {
        fn schema(_: &mut Schema<Self>) {}
    }

    impl Request for Empty {
        const CAPABILITIES: Capabilities = Capabilities::NONE.validate().context();
    }

    struct Things;

    impl Things {
        async fn get(&self, _req: Empty) -> Result<Json<Vec<u8>>, ApiError> {
            Ok(Json(vec![1]))
        }

        async fn delete(&self, _req: Empty) -> Result<(), ApiError> {
            Ok(())
        }

        async fn list(&self, _req: Empty) -> Result<(Json<Vec<u8>>, usize), ApiError> {
            Ok((Json(vec![]), 0))
        }
    }

    impl Handler for Things {
        fn kind(&self) -> Option<&str> {
            Some("Thing")
        }

        fn methods(self: Arc<Self>, set: &mut MethodSet) {
            methods!(self, set, {
                "Get" => get,
                "Delete" => delete,
                "CollectionGet" => list,
            });
        }
    }

    #[test]
    fn test_method_set_arity() {
        let mut set = MethodSet::new();
        Arc::new(Things).methods(&mut set);
        let arities: Vec<(String, usize)> = set
            .into_entries()
            .into_iter()
            .map(|e| (e.name, e.method.signature().arity))
            .collect();
        assert_eq!(
            arities,
            vec![
                ("Get".to_string(), 2),
                ("Delete".to_string(), 1),
                ("CollectionGet".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_capabilities_builder() {
        let caps = Empty::CAPABILITIES;
        assert!(caps.validate && caps.context);
        assert!(!caps.unidi_stream && !caps.bidi_stream);
    }

    #[test]
    fn test_alias_keeps_identity() {
        let things: Arc<dyn Handler> = Arc::new(Things);
        let aliased = alias(Arc::clone(&things), "Widget");
        assert_eq!(aliased.kind(), Some("Thing"));
        assert_eq!(aliased.alias_kind(), Some("Widget"));
        assert_eq!(aliased.type_name(), things.type_name());
    }

    #[test]
    fn test_page_outcome() {
        let reply = (Json(vec!["a", "b"]), 7u32).into_reply().unwrap();
        match reply {
            Reply::Page { items, total } => {
                assert_eq!(items, serde_json::json!(["a", "b"]));
                assert_eq!(total, 7);
            }
            _ => panic!("expected page"),
        }
    }
}
