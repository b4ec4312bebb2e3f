//! Record aggregate: fixed attributes plus typed dynamic values.
//!
//! # Responsibility
//! - Validate fixed attributes on creation and rename.
//! - Own the attribute values of one record, keyed by definition id.
//!
//! # Invariants
//! - `id` never changes after creation.
//! - At most one `AttributeValue` per attribute definition.
//! - Writes against inactive definitions are rejected.
//! - Enum values must be one of the definition's options.

use crate::model::attribute::{AttributeDefinition, AttributeId};
use crate::model::value::{from_storage_form, to_storage_form, InvalidValue, TypedValue};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Stable identifier of one record.
pub type RecordId = Uuid;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn current_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fixed (non-dynamic) attributes supplied when creating a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAttributes {
    pub name: String,
    pub email: String,
}

impl FixedAttributes {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Malformed fixed-attribute input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    InvalidEmail(String),
    BlankName,
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail(value) => write!(f, "`{value}` is not a valid email address"),
            Self::BlankName => write!(f, "name cannot be blank"),
        }
    }
}

impl Error for RecordValidationError {}

/// Aggregate-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    Validation(RecordValidationError),
    InactiveAttribute { wire_name: String },
    InvalidValue(InvalidValue),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::InactiveAttribute { wire_name } => {
                write!(f, "attribute `{wire_name}` is inactive and cannot be written")
            }
            Self::InvalidValue(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InactiveAttribute { .. } => None,
            Self::InvalidValue(err) => Some(err),
        }
    }
}

impl From<RecordValidationError> for RecordError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<InvalidValue> for RecordError {
    fn from(value: InvalidValue) -> Self {
        Self::InvalidValue(value)
    }
}

/// One stored value of a dynamic attribute, owned by a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValue {
    pub id: Uuid,
    pub record_id: RecordId,
    pub definition_id: AttributeId,
    /// Storage form of the typed value; `None` means unset.
    pub raw_value: Option<String>,
}

impl AttributeValue {
    /// Decodes the raw value using the owning definition's type.
    pub fn typed_value(
        &self,
        definition: &AttributeDefinition,
    ) -> Result<Option<TypedValue>, InvalidValue> {
        self.raw_value
            .as_deref()
            .map(|raw| from_storage_form(definition.value_type, raw))
            .transpose()
    }
}

/// Persisted state used to rebuild a record without re-validation.
#[derive(Debug, Clone)]
pub struct RecordParts {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// `(wire_name, value)` pairs.
    pub values: Vec<(String, AttributeValue)>,
}

/// Record aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    name: String,
    email: String,
    created_at: i64,
    updated_at: i64,
    values: HashMap<AttributeId, AttributeValue>,
    wire_names: HashMap<String, AttributeId>,
}

impl Record {
    /// Creates a record with a generated id and the current timestamp.
    pub fn create(fixed: FixedAttributes) -> Result<Self, RecordValidationError> {
        Self::create_at(Uuid::new_v4(), fixed, current_epoch_ms())
    }

    /// Creates a record with caller-provided identity and creation time.
    ///
    /// Used by import/seed paths where identity already exists externally.
    pub fn create_at(
        id: RecordId,
        fixed: FixedAttributes,
        now_ms: i64,
    ) -> Result<Self, RecordValidationError> {
        if !EMAIL_RE.is_match(&fixed.email) {
            return Err(RecordValidationError::InvalidEmail(fixed.email));
        }
        let name = normalize_name(&fixed.name)?;

        Ok(Self {
            id,
            name,
            email: fixed.email,
            created_at: now_ms,
            updated_at: now_ms,
            values: HashMap::new(),
            wire_names: HashMap::new(),
        })
    }

    /// Rebuilds a persisted record. Stored state is trusted as-is.
    pub fn reconstitute(parts: RecordParts) -> Self {
        let mut record = Self {
            id: parts.id,
            name: parts.name,
            email: parts.email,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            values: HashMap::new(),
            wire_names: HashMap::new(),
        };
        for (wire_name, value) in parts.values {
            record.wire_names.insert(wire_name, value.definition_id);
            record.values.insert(value.definition_id, value);
        }
        record
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Replaces the display name; same rules as creation.
    pub fn update_name(&mut self, name: &str, now_ms: i64) -> Result<(), RecordValidationError> {
        self.name = normalize_name(name)?;
        self.updated_at = now_ms;
        Ok(())
    }

    /// Bumps `updated_at` after attribute changes.
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms;
    }

    /// Sets or overwrites the value for `definition`.
    ///
    /// An existing value keeps its id; only the raw value changes.
    ///
    /// # Errors
    /// - `InactiveAttribute` when the definition is deactivated.
    /// - `InvalidValue` when the value type does not match the definition,
    ///   or an enum value is not one of its options.
    pub fn set_attribute_value(
        &mut self,
        definition: &AttributeDefinition,
        value: TypedValue,
    ) -> Result<(), RecordError> {
        if !definition.is_active() {
            return Err(RecordError::InactiveAttribute {
                wire_name: definition.wire_name.clone(),
            });
        }

        let raw = to_storage_form(&value);
        if value.value_type() != definition.value_type {
            return Err(RecordError::InvalidValue(InvalidValue::new(
                definition.value_type,
                raw,
                format!("got a {} value", value.value_type()),
            )));
        }
        if let TypedValue::Enum(option) = &value {
            if !definition.allows_option(option) {
                return Err(RecordError::InvalidValue(InvalidValue::new(
                    definition.value_type,
                    raw,
                    format!("not an option of `{}`", definition.wire_name),
                )));
            }
        }

        match self.values.get_mut(&definition.id) {
            Some(existing) => existing.raw_value = Some(raw),
            None => {
                self.values.insert(
                    definition.id,
                    AttributeValue {
                        id: Uuid::new_v4(),
                        record_id: self.id,
                        definition_id: definition.id,
                        raw_value: Some(raw),
                    },
                );
            }
        }
        self.wire_names
            .insert(definition.wire_name.clone(), definition.id);
        Ok(())
    }

    /// Removes the value stored under `wire_name`; no-op if absent.
    pub fn remove_attribute_value(&mut self, wire_name: &str) {
        if let Some(definition_id) = self.wire_names.remove(wire_name) {
            self.values.remove(&definition_id);
        }
    }

    pub fn get_attribute_value(&self, definition_id: AttributeId) -> Option<&AttributeValue> {
        self.values.get(&definition_id)
    }

    /// All values, in no particular order.
    pub fn all_attribute_values(&self) -> Vec<&AttributeValue> {
        self.values.values().collect()
    }

    /// `(wire_name, value)` pairs, in no particular order.
    pub fn attribute_entries(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.wire_names.iter().filter_map(|(wire_name, definition_id)| {
            self.values
                .get(definition_id)
                .map(|value| (wire_name.as_str(), value))
        })
    }
}

fn normalize_name(name: &str) -> Result<String, RecordValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RecordValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}
