//! Attribute catalog definitions.
//!
//! # Responsibility
//! - Define the typed shape of a dynamic ("custom") field.
//! - Enforce definition-level invariants before anything is persisted.
//!
//! # Invariants
//! - `wire_name` ends with the `__c` suffix and is safe to embed in paths.
//! - `enum_options` is non-empty iff `value_type == ValueType::Enum`.
//! - Deactivation is a soft delete; values referencing an inactive
//!   definition stay readable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Suffix carried by every dynamic attribute wire name.
pub const CUSTOM_FIELD_SUFFIX: &str = "__c";

static WIRE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*__c$").expect("valid wire name regex"));

/// Stable identifier of one attribute definition.
pub type AttributeId = Uuid;

/// Closed set of value types a dynamic attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    /// Free-form text.
    Text,
    /// IEEE-754 double, stored as its shortest decimal string.
    Number,
    /// Calendar date without time component (`YYYY-MM-DD`).
    Date,
    /// One of the definition's enumerated options.
    #[serde(alias = "SELECT")]
    Enum,
}

impl ValueType {
    /// Storage label used in the `attribute_definitions.value_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Enum => "enum",
        }
    }

    /// Parses a storage or user label, case-insensitively.
    ///
    /// `select` is accepted as an alias for `enum`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "enum" | "select" => Some(Self::Enum),
            _ => None,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition-level validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValidationError {
    BlankLabel,
    InvalidWireName(String),
    MissingEnumOptions,
    UnexpectedEnumOptions(ValueType),
    BlankEnumOption,
    DuplicateEnumOption(String),
}

impl Display for AttributeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankLabel => write!(f, "display label cannot be blank"),
            Self::InvalidWireName(value) => write!(
                f,
                "wire name `{value}` must start with a letter, contain only [A-Za-z0-9_] and end with `{CUSTOM_FIELD_SUFFIX}`"
            ),
            Self::MissingEnumOptions => write!(f, "enum attributes require at least one option"),
            Self::UnexpectedEnumOptions(value_type) => {
                write!(f, "{value_type} attributes cannot declare enum options")
            }
            Self::BlankEnumOption => write!(f, "enum options cannot be blank"),
            Self::DuplicateEnumOption(value) => write!(f, "duplicate enum option `{value}`"),
        }
    }
}

impl Error for AttributeValidationError {}

/// Returns whether `value` is a syntactically valid dynamic wire name.
pub fn is_valid_wire_name(value: &str) -> bool {
    WIRE_NAME_RE.is_match(value)
}

/// Returns whether `field` names a dynamic attribute rather than a fixed one.
pub fn is_custom_field(field: &str) -> bool {
    field.ends_with(CUSTOM_FIELD_SUFFIX)
}

/// Input shape for creating a new definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttributeDefinition {
    #[serde(alias = "name")]
    pub display_label: String,
    #[serde(alias = "apiName")]
    pub wire_name: String,
    #[serde(alias = "fieldType")]
    pub value_type: ValueType,
    #[serde(default, alias = "options")]
    pub enum_options: Option<Vec<String>>,
    #[serde(default, alias = "isRequired")]
    pub required: bool,
    #[serde(default)]
    pub display_order: i64,
}

impl NewAttributeDefinition {
    pub fn new(
        display_label: impl Into<String>,
        wire_name: impl Into<String>,
        value_type: ValueType,
    ) -> Self {
        Self {
            display_label: display_label.into(),
            wire_name: wire_name.into(),
            value_type,
            enum_options: None,
            required: false,
            display_order: 0,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_display_order(mut self, display_order: i64) -> Self {
        self.display_order = display_order;
        self
    }
}

/// Typed definition of one dynamic attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub id: AttributeId,
    pub display_label: String,
    /// Globally unique machine name, e.g. `tier__c`.
    pub wire_name: String,
    pub value_type: ValueType,
    /// Ordered option list; `Some` only for enum attributes.
    pub enum_options: Option<Vec<String>>,
    pub required: bool,
    /// Soft-delete flag; inactive definitions reject writes.
    pub active: bool,
    pub display_order: i64,
}

impl AttributeDefinition {
    /// Builds a validated, active definition with a generated id.
    ///
    /// The label is trimmed; enum options are trimmed and kept in input order.
    pub fn new(request: NewAttributeDefinition) -> Result<Self, AttributeValidationError> {
        let definition = Self {
            id: Uuid::new_v4(),
            display_label: request.display_label.trim().to_string(),
            wire_name: request.wire_name.trim().to_string(),
            value_type: request.value_type,
            enum_options: request.enum_options.map(|options| {
                options
                    .iter()
                    .map(|option| option.trim().to_string())
                    .collect()
            }),
            required: request.required,
            active: true,
            display_order: request.display_order,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Checks all definition invariants.
    pub fn validate(&self) -> Result<(), AttributeValidationError> {
        if self.display_label.trim().is_empty() {
            return Err(AttributeValidationError::BlankLabel);
        }
        if !is_valid_wire_name(&self.wire_name) {
            return Err(AttributeValidationError::InvalidWireName(
                self.wire_name.clone(),
            ));
        }

        match (self.value_type, self.enum_options.as_ref()) {
            (ValueType::Enum, None) => Err(AttributeValidationError::MissingEnumOptions),
            (ValueType::Enum, Some(options)) if options.is_empty() => {
                Err(AttributeValidationError::MissingEnumOptions)
            }
            (ValueType::Enum, Some(options)) => {
                let mut seen = HashSet::new();
                for option in options {
                    if option.trim().is_empty() {
                        return Err(AttributeValidationError::BlankEnumOption);
                    }
                    if !seen.insert(option.as_str()) {
                        return Err(AttributeValidationError::DuplicateEnumOption(
                            option.clone(),
                        ));
                    }
                }
                Ok(())
            }
            (other, Some(_)) => Err(AttributeValidationError::UnexpectedEnumOptions(other)),
            (_, None) => Ok(()),
        }
    }

    /// Returns whether `value` is one of this definition's enum options.
    ///
    /// Always `false` for non-enum definitions.
    pub fn allows_option(&self, value: &str) -> bool {
        self.enum_options
            .as_ref()
            .is_some_and(|options| options.iter().any(|option| option == value))
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
