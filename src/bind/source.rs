//! Raw value extraction for each binding category.

use std::collections::HashMap;

use axum::http::HeaderMap;

use super::BindError;

/// Keys mapped to every value supplied for them, in arrival order.
pub type MultiMap = HashMap<String, Vec<String>>;

/// Decode a query string, rejecting malformed percent escapes.
pub fn parse_query(raw: Option<&str>) -> Result<MultiMap, BindError> {
    let Some(raw) = raw else {
        return Ok(MultiMap::new());
    };
    check_escapes(raw).map_err(BindError::MalformedQuery)?;
    Ok(decode(raw.as_bytes()))
}

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse_form(body: &[u8]) -> Result<MultiMap, BindError> {
    let text = std::str::from_utf8(body).map_err(|e| BindError::Form(e.to_string()))?;
    check_escapes(text).map_err(BindError::Form)?;
    Ok(decode(body))
}

fn decode(raw: &[u8]) -> MultiMap {
    let mut values = MultiMap::new();
    for (k, v) in url::form_urlencoded::parse(raw) {
        values.entry(k.into_owned()).or_default().push(v.into_owned());
    }
    values
}

/// `form_urlencoded` passes invalid escapes through verbatim; callers want an error.
fn check_escapes(raw: &str) -> Result<(), String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid URL escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                ));
            }
            i += 3;
            continue;
        }
        i += 1;
    }
    Ok(())
}

/// Header values keyed by lowercase name; non-UTF-8 values are skipped.
pub(crate) fn header_values(headers: &HeaderMap) -> MultiMap {
    let mut values = MultiMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            values
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(v.to_string());
        }
    }
    values
}

pub(crate) fn path_values<I, K, V>(params: I) -> MultiMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    params
        .into_iter()
        .map(|(k, v)| (k.into(), vec![v.into()]))
        .collect()
}
