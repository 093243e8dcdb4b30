//! Word inflection for resource names.
//!
//! Kinds are CamelCase (`ResourceRevision`); paths are plural and dashed
//! (`resource-revisions`); prose splits words (`resource revisions`).

/// Split CamelCase into words, keeping acronyms together (`HTTPRoute` → `HTTP`, `Route`).
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// Whether the last word already looks plural.
pub fn is_plural(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") && !lower.ends_with("is")
}

/// English plural of the last word; plural input is returned as is.
pub fn pluralize(s: &str) -> String {
    if s.is_empty() || is_plural(s) {
        return s.to_string();
    }

    let lower = s.to_ascii_lowercase();
    if lower.ends_with('y') {
        let before = lower.chars().rev().nth(1);
        if before.is_some_and(|c| !is_vowel(c)) {
            return format!("{}ies", &s[..s.len() - 1]);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|e| lower.ends_with(e)) {
        return format!("{}es", s);
    }
    format!("{}s", s)
}

/// `ResourceRevisions` → `resource-revisions`.
pub fn dasherize(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// `ResourceRevisions` → `resource_revisions`.
pub fn underscore(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// `ResourceRevisions` → `resource revisions`.
pub fn decamelize(s: &str) -> String {
    words(s)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ResourceRevisions` → `resourceRevisions`.
pub fn camelize_down_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Prefix a singular noun phrase with its indefinite article.
///
/// A leading `u` takes "a" (`a user`, `a universal`).
pub fn article(phrase: &str) -> String {
    if is_plural(phrase) {
        return phrase.to_string();
    }
    match phrase.chars().next() {
        Some(c) if is_vowel(c) && c.to_ascii_lowercase() != 'u' => format!("an {}", phrase),
        Some(_) => format!("a {}", phrase),
        None => String::new(),
    }
}

/// Uppercase the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
