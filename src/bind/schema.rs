//! Per-type binding schema.
//!
//! A request type describes its bindable fields once, in `Bind::schema`:
//!
//! ```ignore
//! impl Bind for CollectionGetRequest {
//!     fn schema(s: &mut Schema<Self>) {
//!         s.field("project", r#"path:"project""#, |r| &mut r.project)
//!             .inline("pagination", r#"query:",inline""#, |r| &mut r.pagination);
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;

use super::tags::{TagSpec, Tags};
use super::value::FieldValue;
use super::{Bind, BindError, Categories, Category, Found, Parameter, Source};

type Apply<T> =
    Box<dyn Fn(&mut T, &Source<'_>, &TagSpec, usize) -> Result<bool, BindError> + Send + Sync>;

struct Nested {
    categories: fn(usize) -> Categories,
    parameters: fn(usize) -> Vec<Parameter>,
}

struct Entry<T> {
    field: &'static str,
    tags: Tags,
    apply: Apply<T>,
    nested: Option<Nested>,
}

/// Ordered field descriptions of a bindable type.
pub struct Schema<T> {
    entries: Vec<Entry<T>>,
}

impl<T: 'static> Schema<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A keyed field converted through `FieldValue`.
    pub fn field<F: FieldValue>(
        &mut self,
        field: &'static str,
        tags: &'static str,
        access: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        let tags = Tags::parse(tags);
        let options = tags.options().clone();

        let apply = move |target: &mut T, source: &Source<'_>, spec: &TagSpec, _depth: usize| {
            let key = spec.key_or(field);
            let converted = match source.lookup(key) {
                Some(Found::Text(values)) => F::from_text(values, &options),
                Some(Found::Json(value)) => F::from_json(value, &options),
                None => match spec.default.as_deref() {
                    Some(default) => F::from_text(&[default.to_string()], &options),
                    None => return Ok(false),
                },
            };

            *access(target) = converted.map_err(|reason| BindError::Convert {
                category: source.category(),
                field: key.to_string(),
                reason,
            })?;
            Ok(true)
        };

        self.entries.push(Entry {
            field,
            tags,
            apply: Box::new(apply),
            nested: None,
        });
        self
    }

    /// A nested bindable value whose fields are promoted into this one.
    pub fn inline<N: Bind>(
        &mut self,
        field: &'static str,
        tags: &'static str,
        access: fn(&mut T) -> &mut N,
    ) -> &mut Self {
        let apply = move |target: &mut T, source: &Source<'_>, _spec: &TagSpec, depth: usize| {
            access(target).walk(source, depth + 1)
        };

        self.entries.push(Entry {
            field,
            tags: Tags::parse(tags),
            apply: Box::new(apply),
            nested: Some(Nested {
                categories: N::categories,
                parameters: N::parameters,
            }),
        });
        self
    }

    /// A field receiving the whole JSON body, e.g. `json:",inline"` on an entity.
    pub fn body<J>(
        &mut self,
        field: &'static str,
        tags: &'static str,
        access: fn(&mut T) -> &mut J,
    ) -> &mut Self
    where
        J: DeserializeOwned + Send + 'static,
    {
        let apply = move |target: &mut T, source: &Source<'_>, _spec: &TagSpec, _depth: usize| {
            let Source::Json(value) = source else {
                return Ok(false);
            };
            *access(target) = J::deserialize(*value).map_err(BindError::Json)?;
            Ok(true)
        };

        self.entries.push(Entry {
            field,
            tags: Tags::parse(tags),
            apply: Box::new(apply),
            nested: None,
        });
        self
    }

    pub(crate) fn apply(
        &self,
        target: &mut T,
        source: &Source<'_>,
        depth: usize,
    ) -> Result<bool, BindError> {
        let mut set = false;
        for entry in &self.entries {
            let Some(spec) = entry.tags.spec(source.category()) else {
                continue;
            };
            if (entry.apply)(target, source, spec, depth)? {
                set = true;
            }
        }
        Ok(set)
    }

    pub(crate) fn categories(&self, depth: usize) -> Categories {
        let mut categories = Categories::default();
        for entry in &self.entries {
            for category in Category::ALL {
                if entry.tags.spec(category).is_some() {
                    categories.insert(category);
                }
            }
            if let Some(nested) = &entry.nested {
                categories = categories.union((nested.categories)(depth + 1));
            }
        }
        categories
    }

    pub(crate) fn parameters(&self, depth: usize) -> Vec<Parameter> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if let Some(nested) = &entry.nested {
                out.extend((nested.parameters)(depth + 1));
                continue;
            }
            for category in Category::ALL {
                let Some(spec) = entry.tags.spec(category) else {
                    continue;
                };
                if spec.inline {
                    continue;
                }
                out.push(Parameter {
                    name: spec.key_or(entry.field).to_string(),
                    category,
                    required: spec.required(),
                    default: spec.default.clone(),
                });
            }
        }
        out
    }
}
