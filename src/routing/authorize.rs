//! Route authorization hook.

use std::future::Future;
use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::StatusCode;
use futures_util::future::BoxFuture;

use super::profile::RouteProfile;

/// Decides whether a request may reach its route.
///
/// Any status other than 200 aborts the request with that status.
pub trait Authorizer: Send + Sync + 'static {
    fn authorize<'a>(&'a self, parts: &'a Parts, profile: &'a RouteProfile)
        -> BoxFuture<'a, StatusCode>;
}

/// Lets every request through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize<'a>(&'a self, _: &'a Parts, _: &'a RouteProfile) -> BoxFuture<'a, StatusCode> {
        Box::pin(async { StatusCode::OK })
    }
}

/// Authorizer from an async function.
pub struct AuthorizeFn<F>(F);

impl<F, Fut> AuthorizeFn<F>
where
    F: Fn(Parts, RouteProfile) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StatusCode> + Send + 'static,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F, Fut> Authorizer for AuthorizeFn<F>
where
    F: Fn(Parts, RouteProfile) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StatusCode> + Send + 'static,
{
    fn authorize<'a>(&'a self, parts: &'a Parts, profile: &'a RouteProfile)
        -> BoxFuture<'a, StatusCode> {
        Box::pin((self.0)(parts.clone(), profile.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ResourceProfile;
    use axum::http::Method;

    #[tokio::test]
    async fn test_authorize_fn() {
        let deny_delete = AuthorizeFn::new(|_parts: Parts, profile: RouteProfile| async move {
            if profile.method == Method::DELETE {
                StatusCode::FORBIDDEN
            } else {
                StatusCode::OK
            }
        });

        let (parts, _) = axum::http::Request::new(()).into_parts();
        let get = RouteProfile::new(ResourceProfile::default(), Method::GET, "/x".into());
        let delete = RouteProfile::new(ResourceProfile::default(), Method::DELETE, "/x".into());

        assert_eq!(deny_delete.authorize(&parts, &get).await, StatusCode::OK);
        assert_eq!(deny_delete.authorize(&parts, &delete).await, StatusCode::FORBIDDEN);
        assert_eq!(AllowAll.authorize(&parts, &delete).await, StatusCode::OK);
    }
}
