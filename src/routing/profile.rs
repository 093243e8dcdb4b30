//! Resource and route profiles.
//!
//! A `ResourceProfile` is the chain of resources a route is nested under,
//! outermost first:
//!
//! ```text
//! kinds:   [Project,  Environment]
//! paths:   [projects, environments]
//! refers:  [project,  environment]
//!
//! singular: /projects/:project/environments/:environment
//! plural:   /projects/:project/environments
//! ```

use axum::http::Method;
use serde::Serialize;

use super::inflect::{article, camelize_down_first, capitalize, dasherize, decamelize, pluralize};

/// Hierarchical resource chain of a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProfile {
    pub kinds: Vec<String>,
    pub resources: Vec<String>,
    pub resource_paths: Vec<String>,
    pub resource_path_refers: Vec<String>,
}

impl ResourceProfile {
    /// Profile of a single resource kind.
    ///
    /// `alias` replaces the path segment, `internal_kind` the parameter name.
    pub fn of(kind: &str, alias: Option<&str>, internal_kind: Option<&str>) -> Self {
        let resource = camelize_down_first(&pluralize(kind));
        let path = match alias {
            Some(alias) => pluralize(&dasherize(alias)).to_lowercase(),
            None => pluralize(&dasherize(&resource)).to_lowercase(),
        };
        let refer = internal_kind.unwrap_or(kind).to_lowercase();

        Self {
            kinds: vec![kind.to_string()],
            resources: vec![resource],
            resource_paths: vec![path],
            resource_path_refers: vec![refer],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Nest this profile under `parent`; returns an independent copy.
    pub fn prepend(&self, parent: &ResourceProfile) -> ResourceProfile {
        fn join(parent: &[String], child: &[String]) -> Vec<String> {
            parent.iter().chain(child).cloned().collect()
        }

        ResourceProfile {
            kinds: join(&parent.kinds, &self.kinds),
            resources: join(&parent.resources, &self.resources),
            resource_paths: join(&parent.resource_paths, &self.resource_paths),
            resource_path_refers: join(&parent.resource_path_refers, &self.resource_path_refers),
        }
    }

    /// `/p1/:r1/p2/:r2`.
    pub fn singular_path(&self) -> String {
        let mut out = String::new();
        for (path, refer) in self.resource_paths.iter().zip(&self.resource_path_refers) {
            out.push('/');
            out.push_str(path);
            out.push_str("/:");
            out.push_str(refer);
        }
        out
    }

    /// `/p1/:r1/p2`.
    pub fn plural_path(&self) -> String {
        let n = self.resource_paths.len();
        if n == 0 {
            return String::new();
        }
        let mut out = String::new();
        for i in 0..n {
            out.push('/');
            out.push_str(&self.resource_paths[i]);
            if i + 1 < n {
                out.push_str("/:");
                out.push_str(&self.resource_path_refers[i]);
            }
        }
        out
    }
}

/// Everything known about a route besides its handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProfile {
    #[serde(flatten)]
    pub resource: ResourceProfile,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub path: String,
    pub collection: bool,
    pub sub: bool,
    pub custom: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub custom_name: String,
    pub summary: String,
    pub description: String,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl RouteProfile {
    pub fn new(resource: ResourceProfile, method: Method, path: String) -> Self {
        Self {
            resource,
            method,
            path,
            collection: false,
            sub: false,
            custom: false,
            custom_name: String::new(),
            summary: String::new(),
            description: String::new(),
        }
    }

    /// Fill `summary` and `description` from the profile, e.g.
    /// "Get environments of a project." / "Log for a component that belongs to ...".
    pub fn describe(&mut self) {
        let mut sb = String::new();
        if self.custom {
            sb.push_str(&decamelize(&self.custom_name));
        } else {
            sb.push_str(match self.method {
                Method::POST => "create ",
                Method::PUT => "update ",
                Method::DELETE => "delete ",
                _ => "get ",
            });
        }

        let kinds = &self.resource.kinds;
        if kinds.is_empty() {
            let s = capitalize(&format!("{}.", sb.trim_end()));
            self.summary = s.clone();
            self.description = s;
            return;
        }

        if self.custom {
            sb.push_str(" for ");
        }

        let mut subject = decamelize(&kinds[kinds.len() - 1]);
        if self.collection {
            subject = pluralize(&subject);
        }
        sb.push_str(&article(&subject));
        self.summary = capitalize(&format!("{}.", sb));

        // Alternate "of" with rotating prepositions while walking outwards.
        const PREPS: [&str; 3] = [" that belongs to ", " under ", " below "];
        let l = kinds.len() as isize - 2;
        let mut i = l;
        while i >= 0 {
            let iu = i as usize;
            let step = (l - i) as usize;
            if step % 2 == 1 && step / 2 < PREPS.len() {
                sb.push_str(PREPS[step / 2]);
            } else {
                if kinds[iu + 1].starts_with(&kinds[iu]) {
                    i -= 1;
                    continue;
                }
                sb.push_str(" of ");
            }
            sb.push_str(&article(&decamelize(&kinds[iu])));
            i -= 1;
        }
        self.description = capitalize(&format!("{}.", sb));
    }
}
