//! Typed attribute values and their storage form.
//!
//! # Responsibility
//! - Convert typed values to the string form kept in `attribute_values.value`.
//! - Parse storage strings back into typed values, per `ValueType`.
//! - Bridge typed values to the JSON shape of flattened index documents.
//!
//! # Invariants
//! - `from_storage_form(t, &to_storage_form(v)) == v` for every finite `v`
//!   of type `t`.
//! - Dates never carry a time component in storage.
//! - Enum membership is not checked here; the record aggregate owns it.

use crate::model::attribute::ValueType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Logical value of one dynamic attribute.
///
/// Serializes untagged: numbers as JSON numbers, dates as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Enum(String),
}

impl TypedValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::Text,
            Self::Number(_) => ValueType::Number,
            Self::Date(_) => ValueType::Date,
            Self::Enum(_) => ValueType::Enum,
        }
    }

    /// JSON form used inside flattened index documents.
    ///
    /// Non-finite numbers have no JSON form and map to `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Number(value) => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Date(date) => JsonValue::String(date.format(DATE_FORMAT).to_string()),
            Self::Text(value) | Self::Enum(value) => JsonValue::String(value.clone()),
        }
    }

    /// Reads a value back from its index-document JSON form.
    ///
    /// Returns `Ok(None)` for JSON `null`.
    pub fn from_json(value_type: ValueType, value: &JsonValue) -> Result<Option<Self>, InvalidValue> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::String(raw) => from_storage_form(value_type, raw).map(Some),
            JsonValue::Number(number) if value_type == ValueType::Number => number
                .as_f64()
                .map(|value| Some(Self::Number(value)))
                .ok_or_else(|| InvalidValue::new(value_type, number.to_string(), "not a double")),
            other => Err(InvalidValue::new(
                value_type,
                other.to_string(),
                "unexpected JSON type",
            )),
        }
    }
}

/// Coercion failure for one raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue {
    pub value_type: ValueType,
    pub raw: String,
    pub reason: String,
}

impl InvalidValue {
    pub fn new(value_type: ValueType, raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value_type,
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl Display for InvalidValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid {} value `{}`: {}",
            self.value_type, self.raw, self.reason
        )
    }
}

impl Error for InvalidValue {}

/// Serializes a typed value to its storage string.
pub fn to_storage_form(value: &TypedValue) -> String {
    match value {
        // Display for f64 prints the shortest string that parses back exactly.
        TypedValue::Number(number) => number.to_string(),
        TypedValue::Date(date) => date.format(DATE_FORMAT).to_string(),
        TypedValue::Text(text) | TypedValue::Enum(text) => text.clone(),
    }
}

/// Parses a storage (or user-entered) string as `value_type`.
///
/// Dates accept `YYYY-MM-DD` or an RFC 3339 timestamp, whose UTC calendar
/// date is kept.
pub fn from_storage_form(value_type: ValueType, raw: &str) -> Result<TypedValue, InvalidValue> {
    match value_type {
        ValueType::Text => Ok(TypedValue::Text(raw.to_string())),
        ValueType::Enum => Ok(TypedValue::Enum(raw.to_string())),
        ValueType::Number => parse_number(raw).map(TypedValue::Number),
        ValueType::Date => parse_date(raw).map(TypedValue::Date),
    }
}

fn parse_number(raw: &str) -> Result<f64, InvalidValue> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|err| InvalidValue::new(ValueType::Number, raw, err.to_string()))?;
    if !parsed.is_finite() {
        return Err(InvalidValue::new(
            ValueType::Number,
            raw,
            "number must be finite",
        ));
    }
    Ok(parsed)
}

fn parse_date(raw: &str) -> Result<NaiveDate, InvalidValue> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|timestamp| timestamp.with_timezone(&Utc).date_naive())
        .map_err(|_| InvalidValue::new(ValueType::Date, raw, "expected YYYY-MM-DD"))
}
