//! Field tag parsing.
//!
//! Tags use the conventional `key:"value"` notation, several pairs separated
//! by spaces:
//!
//! ```text
//! query:"perPage,default=100" json:"perPage,omitempty"
//! path:"project"
//! query:",inline"
//! query:"since" time_format:"unix" time_utc:"true"
//! ```
//!
//! The first comma-separated item of a category value is the key name, the
//! rest are options (`omitempty`, `inline`, `default=X`). A value of `-`
//! excludes the field from that category.

use super::Category;

/// Options attached to one category of a field tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSpec {
    pub name: String,
    pub omitempty: bool,
    pub inline: bool,
    pub default: Option<String>,
}

impl TagSpec {
    fn parse(value: &str) -> Self {
        let mut items = value.split(',');
        let name = items.next().unwrap_or_default().trim().to_string();

        let mut spec = TagSpec {
            name,
            ..Default::default()
        };
        for item in items {
            match item.trim() {
                "omitempty" => spec.omitempty = true,
                "inline" => spec.inline = true,
                opt => {
                    if let Some(d) = opt.strip_prefix("default=") {
                        spec.default = Some(d.to_string());
                    }
                }
            }
        }
        spec
    }

    /// Lookup key, falling back to the field name when the tag leaves it empty.
    pub fn key_or<'a>(&'a self, field: &'a str) -> &'a str {
        if self.name.is_empty() {
            field
        } else {
            &self.name
        }
    }

    /// Whether a client must supply the key.
    pub fn required(&self) -> bool {
        !self.omitempty && self.default.is_none()
    }
}

/// Conversion hints shared by all categories of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// `time_format`: `unix`, `unixnano`, or a layout description; RFC 3339 when absent.
    pub time_format: Option<String>,
    /// `time_utc`: normalize parsed instants to UTC.
    pub time_utc: bool,
    /// `time_location`: fixed offset such as `+08:00` for layouts without one.
    pub time_location: Option<String>,
}

/// Parsed tag string of one schema field.
#[derive(Debug, Clone, Default)]
pub struct Tags {
    specs: [Option<TagSpec>; 5],
    options: FieldOptions,
}

impl Tags {
    pub fn parse(raw: &str) -> Self {
        let mut tags = Tags::default();
        for (key, value) in pairs(raw) {
            match key {
                "time_format" => tags.options.time_format = Some(value.to_string()),
                "time_utc" => tags.options.time_utc = matches!(value, "1" | "true" | "TRUE" | "True"),
                "time_location" => tags.options.time_location = Some(value.to_string()),
                _ => {
                    let Some(category) = Category::from_tag_key(key) else {
                        continue;
                    };
                    if value == "-" {
                        continue;
                    }
                    tags.specs[category.index()] = Some(TagSpec::parse(value));
                }
            }
        }
        tags
    }

    /// Spec of the given category; `None` when absent or excluded.
    pub fn spec(&self, category: Category) -> Option<&TagSpec> {
        self.specs[category.index()].as_ref()
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }
}

/// Split `key:"value" key2:"value2"` into pairs, tolerating escaped quotes.
fn pairs(raw: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut rest = raw.trim_start();

    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            break;
        };
        let key = rest[..colon].trim();
        let after = &rest[colon + 1..];
        if !after.starts_with('"') || key.is_empty() || key.contains(' ') {
            break;
        }

        let body = &after[1..];
        let mut end = None;
        let mut escaped = false;
        for (i, c) in body.char_indices() {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    end = Some(i);
                    break;
                }
                _ => escaped = false,
            }
        }
        let Some(end) = end else {
            break;
        };

        out.push((key, &body[..end]));
        rest = body[end + 1..].trim_start();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_categories() {
        let tags = Tags::parse(r#"query:"perPage,default=100" json:"perPage,omitempty""#);

        let query = tags.spec(Category::Query).unwrap();
        assert_eq!(query.name, "perPage");
        assert_eq!(query.default.as_deref(), Some("100"));
        assert!(!query.required());

        let json = tags.spec(Category::Json).unwrap();
        assert!(json.omitempty);
        assert!(tags.spec(Category::Path).is_none());
    }

    #[test]
    fn test_dash_excludes_category() {
        let tags = Tags::parse(r#"query:"-" header:"X-Token""#);
        assert!(tags.spec(Category::Query).is_none());
        assert_eq!(tags.spec(Category::Header).unwrap().name, "X-Token");
    }

    #[test]
    fn test_inline_with_empty_name() {
        let tags = Tags::parse(r#"query:",inline""#);
        let spec = tags.spec(Category::Query).unwrap();
        assert!(spec.inline);
        assert_eq!(spec.key_or("pagination"), "pagination");
    }

    #[test]
    fn test_time_options() {
        let tags = Tags::parse(r#"query:"since" time_format:"unix" time_utc:"true""#);
        assert_eq!(tags.options().time_format.as_deref(), Some("unix"));
        assert!(tags.options().time_utc);
        assert!(tags.options().time_location.is_none());
    }

    #[test]
    fn test_malformed_tag_stops_parsing() {
        let tags = Tags::parse(r#"query:"page" broken json:"x""#);
        assert!(tags.spec(Category::Query).is_some());
        assert!(tags.spec(Category::Json).is_none());
    }
}
