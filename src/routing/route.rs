//! Route descriptor.
//!
//! The reflector produces a `Route` per accepted handler method; the
//! router registers it and the dispatcher consults its attributes on
//! every request.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::bind::{Categories, Category, Parameter};

use super::handler::{Capabilities, ErasedMethod};
use super::profile::RouteProfile;

/// What a route's request type can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAttributes {
    pub validate: bool,
    pub context: bool,
    pub unidi_stream: bool,
    pub bidi_stream: bool,
    pub bind_header: bool,
    pub bind_query: bool,
    pub bind_path: bool,
    pub bind_form: bool,
    pub bind_json: bool,
}

impl RequestAttributes {
    pub(crate) fn from_parts(capabilities: Capabilities, categories: Categories) -> Self {
        Self {
            validate: capabilities.validate,
            context: capabilities.context,
            unidi_stream: capabilities.unidi_stream,
            bidi_stream: capabilities.bidi_stream,
            bind_header: categories.contains(Category::Header),
            bind_query: categories.contains(Category::Query),
            bind_path: categories.contains(Category::Path),
            bind_form: categories.contains(Category::Form),
            bind_json: categories.contains(Category::Json),
        }
    }

    pub fn has_stream(&self) -> bool {
        self.unidi_stream || self.bidi_stream
    }

    pub fn binds(&self, category: Category) -> bool {
        match category {
            Category::Path => self.bind_path,
            Category::Header => self.bind_header,
            Category::Query => self.bind_query,
            Category::Form => self.bind_form,
            Category::Json => self.bind_json,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResponseAttributes {
    /// The method also returns a total count.
    pub page: bool,
}

/// A resolved endpoint.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(flatten)]
    pub profile: RouteProfile,
    pub handler_type: &'static str,
    pub handler_func: String,
    pub request_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<&'static str>,
    pub request_attributes: RequestAttributes,
    pub response_attributes: ResponseAttributes,
    pub parameters: Vec<Parameter>,
    /// Indices into the router's advice providers accepted by the request type.
    #[serde(skip)]
    pub(crate) advice_providers: Vec<usize>,
    #[serde(skip)]
    pub(crate) method: Arc<dyn ErasedMethod>,
}

impl Route {
    pub fn is_stream(&self) -> bool {
        self.request_attributes.has_stream()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.profile.method)
            .field("path", &self.profile.path)
            .field("handler_type", &self.handler_type)
            .field("handler_func", &self.handler_func)
            .field("request_attributes", &self.request_attributes)
            .field("response_attributes", &self.response_attributes)
            .finish_non_exhaustive()
    }
}
