//! Request binding subsystem.
//!
//! # Data Flow
//! ```text
//! raw request
//!     → source.rs (query / header / path / form / JSON → Source)
//!     → Bind::walk (schema.rs entries, depth limited)
//!         → tags.rs  (category spec: name, default, inline)
//!         → value.rs (string or JSON → typed field)
//!     → populated request value
//! ```
//!
//! # Design Decisions
//! - A field is written only when its key is present or it has a default,
//!   so later stages never clobber what earlier stages set
//! - Nesting is bounded by `MAX_DEPTH`; self-referential types fail with
//!   "recursion too deep" instead of exhausting the stack
//! - Map targets take the whole source (form-style fast path)

pub mod schema;
pub mod source;
pub mod tags;
pub mod value;

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use schema::Schema;
pub use source::{parse_form, parse_query, MultiMap};
pub use tags::{FieldOptions, TagSpec};
pub use value::{ConvertError, FieldValue};

/// Recursion ceiling for nested bindable values.
pub const MAX_DEPTH: usize = 100;

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Path,
    Header,
    Query,
    Form,
    Json,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Path,
        Category::Header,
        Category::Query,
        Category::Form,
        Category::Json,
    ];

    pub fn tag_key(self) -> &'static str {
        match self {
            Category::Path => "path",
            Category::Header => "header",
            Category::Query => "query",
            Category::Form => "form",
            Category::Json => "json",
        }
    }

    pub(crate) fn from_tag_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.tag_key() == key)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_key())
    }
}

/// Set of categories a type binds from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Categories([bool; 5]);

impl Categories {
    pub fn insert(&mut self, category: Category) {
        self.0[category.index()] = true;
    }

    pub fn contains(&self, category: Category) -> bool {
        self.0[category.index()]
    }

    pub fn union(self, other: Categories) -> Categories {
        let mut out = self;
        for (i, set) in other.0.into_iter().enumerate() {
            out.0[i] |= set;
        }
        out
    }
}

/// A bindable key as seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub category: Category,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Binding failures; all of them render as 400.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("recursion too deep")]
    RecursionTooDeep,

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("invalid {category} parameter {field:?}: {reason}")]
    Convert {
        category: Category,
        field: String,
        reason: ConvertError,
    },

    #[error("cannot convert to map of strings slice")]
    ConvertMapStringSlice,

    #[error("cannot convert to map of strings")]
    ConvertToMapString,

    #[error("invalid form body: {0}")]
    Form(String),

    #[error("invalid json body: {0}")]
    Json(#[source] serde_json::Error),
}

/// Value found under a key.
pub enum Found<'a> {
    Text(&'a [String]),
    Json(&'a Value),
}

/// Raw values of one category.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Text {
        category: Category,
        values: &'a MultiMap,
    },
    Json(&'a Value),
}

impl<'a> Source<'a> {
    pub fn text(category: Category, values: &'a MultiMap) -> Self {
        Source::Text { category, values }
    }

    pub fn category(&self) -> Category {
        match self {
            Source::Text { category, .. } => *category,
            Source::Json(_) => Category::Json,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<Found<'a>> {
        match *self {
            Source::Text {
                category: Category::Header,
                values,
            } => values
                .get(&key.to_ascii_lowercase())
                .map(|v| Found::Text(v.as_slice())),
            Source::Text { values, .. } => values.get(key).map(|v| Found::Text(v.as_slice())),
            Source::Json(Value::Object(map)) => map.get(key).map(Found::Json),
            Source::Json(_) => None,
        }
    }
}

/// A type the binder can populate from request sources.
pub trait Bind: Send + 'static {
    /// Describe the bindable fields.
    fn schema(schema: &mut Schema<Self>)
    where
        Self: Sized;

    /// Populate from one source; returns whether anything was set.
    fn walk(&mut self, source: &Source<'_>, depth: usize) -> Result<bool, BindError>
    where
        Self: Sized,
    {
        if depth >= MAX_DEPTH {
            return Err(BindError::RecursionTooDeep);
        }
        let mut schema = Schema::new();
        Self::schema(&mut schema);
        schema.apply(self, source, depth)
    }

    /// Categories this type binds from.
    fn categories(depth: usize) -> Categories
    where
        Self: Sized,
    {
        if depth >= MAX_DEPTH {
            return Categories::default();
        }
        let mut schema = Schema::new();
        Self::schema(&mut schema);
        schema.categories(depth)
    }

    /// Flattened keys of this type.
    fn parameters(depth: usize) -> Vec<Parameter>
    where
        Self: Sized,
    {
        if depth >= MAX_DEPTH {
            return Vec::new();
        }
        let mut schema = Schema::new();
        Self::schema(&mut schema);
        schema.parameters(depth)
    }
}

/// Allocated only when something binds into it.
impl<N: Bind + Default> Bind for Option<N> {
    fn schema(_: &mut Schema<Self>) {}

    fn walk(&mut self, source: &Source<'_>, depth: usize) -> Result<bool, BindError> {
        if depth >= MAX_DEPTH {
            return Err(BindError::RecursionTooDeep);
        }
        if let Some(inner) = self {
            return inner.walk(source, depth + 1);
        }

        let mut fresh = N::default();
        let set = fresh.walk(source, depth + 1)?;
        if set {
            *self = Some(fresh);
        }
        Ok(set)
    }

    fn categories(depth: usize) -> Categories {
        N::categories(depth + 1)
    }

    fn parameters(depth: usize) -> Vec<Parameter> {
        N::parameters(depth + 1)
    }
}

impl<N: Bind> Bind for Box<N> {
    fn schema(_: &mut Schema<Self>) {}

    fn walk(&mut self, source: &Source<'_>, depth: usize) -> Result<bool, BindError> {
        (**self).walk(source, depth)
    }

    fn categories(depth: usize) -> Categories {
        N::categories(depth)
    }

    fn parameters(depth: usize) -> Vec<Parameter> {
        N::parameters(depth)
    }
}

/// Takes every key of the source with all of its values.
impl Bind for HashMap<String, Vec<String>> {
    fn schema(_: &mut Schema<Self>) {}

    fn walk(&mut self, source: &Source<'_>, _depth: usize) -> Result<bool, BindError> {
        match source {
            Source::Text { values, .. } => {
                for (k, v) in values.iter() {
                    self.insert(k.clone(), v.clone());
                }
                Ok(!values.is_empty())
            }
            Source::Json(Value::Object(map)) => {
                for (k, v) in map {
                    let Value::Array(items) = v else {
                        return Err(BindError::ConvertMapStringSlice);
                    };
                    let strings = items
                        .iter()
                        .map(|i| i.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(BindError::ConvertMapStringSlice)?;
                    self.insert(k.clone(), strings);
                }
                Ok(!map.is_empty())
            }
            Source::Json(_) => Err(BindError::ConvertMapStringSlice),
        }
    }

    fn categories(_: usize) -> Categories {
        Categories::default()
    }

    fn parameters(_: usize) -> Vec<Parameter> {
        Vec::new()
    }
}

/// Takes every key of the source with its last value.
impl Bind for HashMap<String, String> {
    fn schema(_: &mut Schema<Self>) {}

    fn walk(&mut self, source: &Source<'_>, _depth: usize) -> Result<bool, BindError> {
        match source {
            Source::Text { values, .. } => {
                for (k, v) in values.iter() {
                    if let Some(last) = v.last() {
                        self.insert(k.clone(), last.clone());
                    }
                }
                Ok(!values.is_empty())
            }
            Source::Json(Value::Object(map)) => {
                for (k, v) in map {
                    let Value::String(s) = v else {
                        return Err(BindError::ConvertToMapString);
                    };
                    self.insert(k.clone(), s.clone());
                }
                Ok(!map.is_empty())
            }
            Source::Json(_) => Err(BindError::ConvertToMapString),
        }
    }

    fn categories(_: usize) -> Categories {
        Categories::default()
    }

    fn parameters(_: usize) -> Vec<Parameter> {
        Vec::new()
    }
}

/// Bind a raw query string.
pub fn bind_query<T: Bind>(target: &mut T, raw: Option<&str>) -> Result<bool, BindError> {
    let values = parse_query(raw)?;
    target.walk(&Source::text(Category::Query, &values), 0)
}

/// Bind request headers; keys match case-insensitively.
pub fn bind_header<T: Bind>(
    target: &mut T,
    headers: &axum::http::HeaderMap,
) -> Result<bool, BindError> {
    let values = source::header_values(headers);
    target.walk(&Source::text(Category::Header, &values), 0)
}

/// Bind matched path parameters.
pub fn bind_path<T, I, K, V>(target: &mut T, params: I) -> Result<bool, BindError>
where
    T: Bind,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let values = source::path_values(params);
    target.walk(&Source::text(Category::Path, &values), 0)
}

/// Bind decoded form fields.
pub fn bind_form<T: Bind>(target: &mut T, values: &MultiMap) -> Result<bool, BindError> {
    target.walk(&Source::text(Category::Form, values), 0)
}

/// Bind a JSON body.
pub fn bind_json<T: Bind>(target: &mut T, body: &[u8]) -> Result<bool, BindError> {
    let value: Value = serde_json::from_slice(body).map_err(BindError::Json)?;
    target.walk(&Source::Json(&value), 0)
}
