use crate::catalog::AttributeCatalog;
use crate::model::record::{Record, RecordId};
use crate::model::value::InvalidValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One flattened record as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    /// Wire name -> typed JSON value (numbers as numbers, dates as strings).
    pub custom_fields: Map<String, JsonValue>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IndexDocument {
    /// Flattens `record` using the active definitions of `catalog`.
    ///
    /// Values of inactive or unknown definitions and unset values are left
    /// out, so `custom_fields` mirrors the active catalog at build time.
    pub fn from_record(record: &Record, catalog: &AttributeCatalog) -> Result<Self, InvalidValue> {
        let mut custom_fields = Map::new();
        for value in record.all_attribute_values() {
            let Some(definition) = catalog.resolve_id(value.definition_id) else {
                continue;
            };
            if !definition.is_active() {
                continue;
            }
            if let Some(typed) = value.typed_value(definition)? {
                custom_fields.insert(definition.wire_name.clone(), typed.to_json());
            }
        }

        Ok(Self {
            id: record.id(),
            name: record.name().to_string(),
            email: record.email().to_string(),
            custom_fields,
            created_at: record.created_at(),
            updated_at: record.updated_at(),
        })
    }
}
