//! Request advice.
//!
//! An advice provider injects a value into requests that ask for it by
//! name, e.g. the request ID or a shared handle. Which providers apply to
//! a route is decided once at registration.

use std::any::Any;

use axum::http::request::Parts;

use crate::http::request::X_REQUEST_ID;

use super::handler::Request;

/// A value able to receive advice.
pub trait AdviceTarget: Send {
    fn accepts(&self, advice: &str) -> bool;

    fn receive(&mut self, advice: &str, value: Box<dyn Any + Send>);
}

impl<R: Request> AdviceTarget for R {
    fn accepts(&self, advice: &str) -> bool {
        self.accepts_advice(advice)
    }

    fn receive(&mut self, advice: &str, value: Box<dyn Any + Send>) {
        self.receive_advice(advice, value)
    }
}

/// Injects one kind of advice.
pub trait AdviceProvider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Whether targets of this type take the advice.
    fn can_set(&self, target: &dyn AdviceTarget) -> bool {
        target.accepts(self.name())
    }

    fn set(&self, target: &mut dyn AdviceTarget, parts: &Parts);
}

/// Advises the request ID as a `String`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdAdvice;

impl RequestIdAdvice {
    pub const NAME: &'static str = "request-id";
}

impl AdviceProvider for RequestIdAdvice {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn set(&self, target: &mut dyn AdviceTarget, parts: &Parts) {
        let id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        target.receive(Self::NAME, Box::new(id));
    }
}

/// Advises a clone of a fixed value.
#[derive(Debug, Clone)]
pub struct ValueAdvice<T> {
    name: &'static str,
    value: T,
}

impl<T: Clone + Send + Sync + 'static> ValueAdvice<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self { name, value }
    }
}

impl<T: Clone + Send + Sync + 'static> AdviceProvider for ValueAdvice<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn set(&self, target: &mut dyn AdviceTarget, _parts: &Parts) {
        target.receive(self.name, Box::new(self.value.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{Bind, Schema};

    #[derive(Default)]
    struct Advised {
        request_id: String,
        tenant: Option<u32>,
    }

    impl Bind for Advised {
        fn schema(_: &mut Schema<Self>) {}
    }

    impl Request for Advised {
        fn accepts_advice(&self, advice: &str) -> bool {
            matches!(advice, RequestIdAdvice::NAME | "tenant")
        }

        fn receive_advice(&mut self, advice: &str, value: Box<dyn Any + Send>) {
            match advice {
                RequestIdAdvice::NAME => {
                    if let Ok(id) = value.downcast::<String>() {
                        self.request_id = *id;
                    }
                }
                "tenant" => self.tenant = value.downcast::<u32>().ok().map(|v| *v),
                _ => {}
            }
        }
    }

    #[derive(Default)]
    struct Plain;

    impl Bind for Plain {
        fn schema(_: &mut Schema<Self>) {}
    }

    impl Request for Plain {}

    #[test]
    fn test_request_id_advice() {
        let (parts, _) = axum::http::Request::builder()
            .header(X_REQUEST_ID, "abc")
            .body(())
            .unwrap()
            .into_parts();

        let mut req = Advised::default();
        assert!(RequestIdAdvice.can_set(&req));
        assert!(!RequestIdAdvice.can_set(&Plain));
        RequestIdAdvice.set(&mut req, &parts);
        assert_eq!(req.request_id, "abc");
    }

    #[test]
    fn test_value_advice() {
        let (parts, _) = axum::http::Request::new(()).into_parts();
        let advice = ValueAdvice::new("tenant", 7u32);
        let mut req = Advised::default();
        advice.set(&mut req, &parts);
        assert_eq!(req.tenant, Some(7));
    }
}
