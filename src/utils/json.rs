use chrono::NaiveDate;
use serde_json::Value;

use crate::validation::ValidationError;

/// A PATCH field: left out, explicitly cleared, or given a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullableValue<T> {
    Omitted,
    Null,
    Value(T),
}

pub fn classify_nullable(
    field: &'static str,
    value: Option<&Value>,
) -> Result<NullableValue<String>, ValidationError> {
    match value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::Value(s.to_owned())),
        Some(other) => Err(ValidationError::new(
            field,
            format!("expected string or null, got {other}"),
        )),
    }
}

/// Like [`classify_nullable`] for `YYYY-MM-DD` dates.
pub fn classify_nullable_date(
    field: &'static str,
    value: Option<&Value>,
) -> Result<NullableValue<NaiveDate>, ValidationError> {
    match classify_nullable(field, value)? {
        NullableValue::Omitted => Ok(NullableValue::Omitted),
        NullableValue::Null => Ok(NullableValue::Null),
        NullableValue::Value(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(NullableValue::Value)
            .map_err(|_| ValidationError::new(field, format!("'{raw}' is not a valid date"))),
    }
}
