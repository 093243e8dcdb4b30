//! Conversion of raw request values into typed fields.
//!
//! Text sources (path, header, query, form) hand every field the list of
//! strings found under its key; JSON sources hand over the decoded value.
//! Scalars take the first string, sequences take all of them, and an empty
//! string converts to the zero value of numeric and boolean types.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::tags::FieldOptions;

/// Reason a raw value could not be converted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConvertError(String);

impl ConvertError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// A field type the binder knows how to fill.
pub trait FieldValue: Sized + Send + 'static {
    /// Convert the strings found under the field's key.
    fn from_text(values: &[String], options: &FieldOptions) -> Result<Self, ConvertError>;

    /// Convert the JSON value found under the field's key.
    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError>;
}

fn first(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or_default()
}

/// JSON strings go through the text conversion, anything else through serde.
fn json_or_text<T>(value: &Value, options: &FieldOptions) -> Result<T, ConvertError>
where
    T: FieldValue + DeserializeOwned,
{
    match value {
        Value::String(s) => T::from_text(std::slice::from_ref(s), options),
        v => Ok(T::deserialize(v)?),
    }
}

macro_rules! impl_number {
    ($($t:ty),* $(,)?) => {
        $(
            impl FieldValue for $t {
                fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
                    let v = first(values);
                    if v.is_empty() {
                        return Ok(<$t>::default());
                    }
                    v.parse::<$t>()
                        .map_err(|e| ConvertError::new(format!("parsing {:?}: {}", v, e)))
                }

                fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
                    json_or_text(value, options)
                }
            }
        )*
    };
}

impl_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl FieldValue for bool {
    fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
        match first(values) {
            "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            v => Err(ConvertError::new(format!("parsing {:?}: invalid syntax", v))),
        }
    }

    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
        json_or_text(value, options)
    }
}

impl FieldValue for String {
    fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
        Ok(first(values).to_string())
    }

    fn from_json(value: &Value, _: &FieldOptions) -> Result<Self, ConvertError> {
        Ok(String::deserialize(value)?)
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn from_text(values: &[String], options: &FieldOptions) -> Result<Self, ConvertError> {
        T::from_text(values, options).map(Some)
    }

    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            v => T::from_json(v, options).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn from_text(values: &[String], options: &FieldOptions) -> Result<Self, ConvertError> {
        values
            .iter()
            .map(|v| T::from_text(std::slice::from_ref(v), options))
            .collect()
    }

    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
        match value {
            Value::Array(items) => items.iter().map(|v| T::from_json(v, options)).collect(),
            Value::Null => Ok(Vec::new()),
            v => T::from_json(v, options).map(|item| vec![item]),
        }
    }
}

impl FieldValue for Duration {
    fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
        let v = first(values);
        if v.is_empty() {
            return Ok(Duration::ZERO);
        }
        parse_duration(v)
    }

    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
        match value {
            Value::String(s) => Self::from_text(std::slice::from_ref(s), options),
            // Numbers are nanoseconds.
            v => Ok(Duration::from_nanos(u64::deserialize(v)?)),
        }
    }
}

impl FieldValue for OffsetDateTime {
    fn from_text(values: &[String], options: &FieldOptions) -> Result<Self, ConvertError> {
        let v = first(values);
        if v.is_empty() {
            return Ok(OffsetDateTime::UNIX_EPOCH);
        }
        parse_time(v, options)
    }

    fn from_json(value: &Value, options: &FieldOptions) -> Result<Self, ConvertError> {
        match value {
            Value::String(s) => Self::from_text(std::slice::from_ref(s), options),
            Value::Number(n) => {
                let secs = n
                    .as_i64()
                    .ok_or_else(|| ConvertError::new(format!("invalid unix time {}", n)))?;
                let t = OffsetDateTime::from_unix_timestamp(secs)
                    .map_err(|e| ConvertError::new(e.to_string()))?;
                shift(t, zone(options)?)
            }
            v => Err(ConvertError::new(format!("invalid time value {}", v))),
        }
    }
}

impl FieldValue for Value {
    fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
        let v = first(values);
        if v.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(v)?)
    }

    fn from_json(value: &Value, _: &FieldOptions) -> Result<Self, ConvertError> {
        Ok(value.clone())
    }
}

macro_rules! impl_json_text {
    ($($ty:ident),*) => {
        $(
            impl<V> FieldValue for $ty<String, V>
            where
                V: DeserializeOwned + Send + 'static,
            {
                fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
                    let v = first(values);
                    if v.is_empty() {
                        return Ok($ty::new());
                    }
                    Ok(serde_json::from_str(v)?)
                }

                fn from_json(value: &Value, _: &FieldOptions) -> Result<Self, ConvertError> {
                    Ok(Self::deserialize(value)?)
                }
            }
        )*
    };
}

impl_json_text!(HashMap, BTreeMap);

/// Structured values carried as JSON text, e.g. `?filter={"name":"x"}`.
impl<T> FieldValue for axum::Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn from_text(values: &[String], _: &FieldOptions) -> Result<Self, ConvertError> {
        Ok(axum::Json(serde_json::from_str(first(values))?))
    }

    fn from_json(value: &Value, _: &FieldOptions) -> Result<Self, ConvertError> {
        Ok(axum::Json(T::deserialize(value)?))
    }
}

/// Parse durations such as `300ms`, `1.5h` or `2h45m`.
pub fn parse_duration(s: &str) -> Result<Duration, ConvertError> {
    let invalid = || ConvertError::new(format!("invalid duration {:?}", s));

    let rest = s.strip_prefix('+').unwrap_or(s);
    if rest.starts_with('-') {
        return Err(ConvertError::new(format!("negative duration {:?}", s)));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = 0f64;
    let mut rest = rest;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1f64,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(ConvertError::new(format!("missing unit in duration {:?}", s))),
            unit => {
                return Err(ConvertError::new(format!(
                    "unknown unit {:?} in duration {:?}",
                    unit, s
                )))
            }
        };
        rest = &rest[unit_len..];
        total += number * nanos_per_unit;
    }

    if total > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total.round() as u64))
}

fn zone(options: &FieldOptions) -> Result<UtcOffset, ConvertError> {
    if options.time_utc {
        return Ok(UtcOffset::UTC);
    }
    match options.time_location.as_deref() {
        Some("UTC") | Some("utc") => Ok(UtcOffset::UTC),
        Some(loc) => {
            let format = time::macros::format_description!(
                "[offset_hour sign:mandatory]:[offset_minute]"
            );
            UtcOffset::parse(loc, format)
                .map_err(|e| ConvertError::new(format!("invalid time location {:?}: {}", loc, e)))
        }
        None => Ok(UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)),
    }
}

/// `t` in `offset`, rejecting instants that leave the supported range.
fn shift(t: OffsetDateTime, offset: UtcOffset) -> Result<OffsetDateTime, ConvertError> {
    t.checked_to_offset(offset)
        .ok_or_else(|| ConvertError::new(format!("time {} out of range at offset {}", t, offset)))
}

fn parse_time(v: &str, options: &FieldOptions) -> Result<OffsetDateTime, ConvertError> {
    match options.time_format.as_deref() {
        Some("unix") => {
            let secs: i64 = v
                .parse()
                .map_err(|e| ConvertError::new(format!("parsing {:?}: {}", v, e)))?;
            let t = OffsetDateTime::from_unix_timestamp(secs)
                .map_err(|e| ConvertError::new(e.to_string()))?;
            shift(t, zone(options)?)
        }
        Some("unixnano") => {
            let nanos: i128 = v
                .parse()
                .map_err(|e| ConvertError::new(format!("parsing {:?}: {}", v, e)))?;
            let t = OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .map_err(|e| ConvertError::new(e.to_string()))?;
            shift(t, zone(options)?)
        }
        None | Some("") => {
            let t = OffsetDateTime::parse(v, &Rfc3339)
                .map_err(|e| ConvertError::new(format!("parsing {:?}: {}", v, e)))?;
            if options.time_utc {
                return shift(t, UtcOffset::UTC);
            }
            Ok(t)
        }
        Some(layout) => {
            let format = time::format_description::parse_borrowed::<2>(layout)
                .map_err(|e| ConvertError::new(format!("invalid time format {:?}: {}", layout, e)))?;
            let t = PrimitiveDateTime::parse(v, &format)
                .map_err(|e| ConvertError::new(format!("parsing {:?}: {}", v, e)))?
                .assume_offset(zone(options)?);
            // The same instant must be representable in UTC.
            shift(t, UtcOffset::UTC)?;
            Ok(t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text<T: FieldValue>(v: &str) -> Result<T, ConvertError> {
        T::from_text(&[v.to_string()], &FieldOptions::default())
    }

    #[test]
    fn test_empty_string_is_zero() {
        assert_eq!(text::<i64>("").unwrap(), 0);
        assert_eq!(text::<u8>("").unwrap(), 0);
        assert!(!text::<bool>("").unwrap());
        assert_eq!(text::<f64>("").unwrap(), 0.0);
    }

    #[test]
    fn test_integer_overflow_rejected() {
        assert!(text::<i8>("128").is_err());
        assert_eq!(text::<i8>("-128").unwrap(), -128);
        assert!(text::<u32>("-1").is_err());
    }

    #[test]
    fn test_bool_spellings() {
        assert!(text::<bool>("T").unwrap());
        assert!(text::<bool>("True").unwrap());
        assert!(!text::<bool>("0").unwrap());
        assert!(text::<bool>("yes").is_err());
    }

    #[test]
    fn test_sequence_takes_every_value() {
        let v = Vec::<i32>::from_text(
            &["1".to_string(), "2".to_string(), "3".to_string()],
            &FieldOptions::default(),
        )
        .unwrap();
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2h45m").unwrap(), Duration::from_secs(9900));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[test]
    fn test_time_formats() {
        let rfc = text::<OffsetDateTime>("2023-06-01T10:00:00+08:00").unwrap();
        assert_eq!(rfc.unix_timestamp(), 1685584800);

        let options = FieldOptions {
            time_format: Some("unix".into()),
            time_utc: true,
            ..Default::default()
        };
        let unix = OffsetDateTime::from_text(&["1685584800".to_string()], &options).unwrap();
        assert_eq!(unix, rfc);
        assert_eq!(unix.offset(), UtcOffset::UTC);

        let options = FieldOptions {
            time_format: Some("[year]-[month]-[day] [hour]:[minute]:[second]".into()),
            time_location: Some("+08:00".into()),
            ..Default::default()
        };
        let layout =
            OffsetDateTime::from_text(&["2023-06-01 10:00:00".to_string()], &options).unwrap();
        assert_eq!(layout, rfc);
    }

    #[test]
    fn test_time_out_of_range_rejected() {
        let options = FieldOptions {
            time_format: Some("unix".into()),
            time_location: Some("+01:00".into()),
            ..Default::default()
        };
        // 9999-12-31T23:59:59Z
        let err = OffsetDateTime::from_text(&["253402300799".to_string()], &options).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(OffsetDateTime::from_json(&serde_json::json!(253402300799i64), &options).is_err());

        let options = FieldOptions {
            time_format: Some("[year]-[month]-[day] [hour]:[minute]:[second]".into()),
            time_location: Some("-01:00".into()),
            ..Default::default()
        };
        assert!(OffsetDateTime::from_text(&["9999-12-31 23:30:00".to_string()], &options).is_err());

        let options = FieldOptions {
            time_format: Some("unix".into()),
            time_location: Some("-01:00".into()),
            ..Default::default()
        };
        let t = OffsetDateTime::from_text(&["253402300799".to_string()], &options).unwrap();
        assert_eq!(t.unix_timestamp(), 253402300799);
    }

    #[test]
    fn test_json_text_for_structured_fields() {
        let m = HashMap::<String, i32>::from_text(
            &[r#"{"a":1,"b":2}"#.to_string()],
            &FieldOptions::default(),
        )
        .unwrap();
        assert_eq!(m.get("b"), Some(&2));
    }

    #[test]
    fn test_json_numbers_as_strings() {
        let v = i32::from_json(&Value::String("42".into()), &FieldOptions::default()).unwrap();
        assert_eq!(v, 42);
        let v = i32::from_json(&serde_json::json!(7), &FieldOptions::default()).unwrap();
        assert_eq!(v, 7);
    }
}
