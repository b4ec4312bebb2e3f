//! Attribute definition repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the attribute catalog in `attribute_definitions`.
//! - Resolve many definitions by id in a single statement.
//!
//! # Invariants
//! - Write paths call `AttributeDefinition::validate()` before SQL mutations.
//! - `wire_name` uniqueness is enforced by the schema.
//! - Inactive definitions are returned by every read except `list_active`.

use crate::model::attribute::{AttributeDefinition, AttributeId, ValueType};
use crate::repo::{
    bool_to_int, in_list, int_to_bool, parse_uuid, RepoError, RepoResult, IN_LIST_CHUNK,
};
use rusqlite::{params, params_from_iter, Connection, Row};

const DEFINITION_SELECT_SQL: &str = "SELECT
    id,
    display_label,
    wire_name,
    value_type,
    enum_options,
    required,
    active,
    display_order
FROM attribute_definitions";

const DEFINITION_ORDER_SQL: &str = " ORDER BY display_order ASC, created_at ASC, wire_name ASC";

/// Repository interface for the attribute catalog.
pub trait AttributeRepository {
    fn create_definition(&self, definition: &AttributeDefinition) -> RepoResult<AttributeId>;
    /// Rewrites label, options, flags and order; `wire_name` and type are fixed.
    fn update_definition(&self, definition: &AttributeDefinition) -> RepoResult<()>;
    fn get_definition(&self, id: AttributeId) -> RepoResult<Option<AttributeDefinition>>;
    fn find_by_wire_name(&self, wire_name: &str) -> RepoResult<Option<AttributeDefinition>>;
    /// All definitions, active or not.
    fn list_definitions(&self) -> RepoResult<Vec<AttributeDefinition>>;
    fn list_active(&self) -> RepoResult<Vec<AttributeDefinition>>;
}

/// SQLite-backed attribute repository.
pub struct SqliteAttributeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttributeRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AttributeRepository for SqliteAttributeRepository<'_> {
    fn create_definition(&self, definition: &AttributeDefinition) -> RepoResult<AttributeId> {
        definition
            .validate()
            .map_err(|err| RepoError::InvalidData(err.to_string()))?;

        self.conn.execute(
            "INSERT INTO attribute_definitions (
                id,
                display_label,
                wire_name,
                value_type,
                enum_options,
                required,
                active,
                display_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                definition.id.to_string(),
                definition.display_label.as_str(),
                definition.wire_name.as_str(),
                definition.value_type.as_str(),
                encode_options(definition.enum_options.as_deref())?,
                bool_to_int(definition.required),
                bool_to_int(definition.active),
                definition.display_order,
            ],
        )?;

        Ok(definition.id)
    }

    fn update_definition(&self, definition: &AttributeDefinition) -> RepoResult<()> {
        definition
            .validate()
            .map_err(|err| RepoError::InvalidData(err.to_string()))?;

        let changed = self.conn.execute(
            "UPDATE attribute_definitions
             SET
                display_label = ?2,
                enum_options = ?3,
                required = ?4,
                active = ?5,
                display_order = ?6
             WHERE id = ?1;",
            params![
                definition.id.to_string(),
                definition.display_label.as_str(),
                encode_options(definition.enum_options.as_deref())?,
                bool_to_int(definition.required),
                bool_to_int(definition.active),
                definition.display_order,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(definition.id));
        }
        Ok(())
    }

    fn get_definition(&self, id: AttributeId) -> RepoResult<Option<AttributeDefinition>> {
        query_optional(
            self.conn,
            &format!("{DEFINITION_SELECT_SQL} WHERE id = ?1;"),
            &id.to_string(),
        )
    }

    fn find_by_wire_name(&self, wire_name: &str) -> RepoResult<Option<AttributeDefinition>> {
        query_optional(
            self.conn,
            &format!("{DEFINITION_SELECT_SQL} WHERE wire_name = ?1;"),
            wire_name,
        )
    }

    fn list_definitions(&self) -> RepoResult<Vec<AttributeDefinition>> {
        query_all(self.conn, &format!("{DEFINITION_SELECT_SQL}{DEFINITION_ORDER_SQL};"))
    }

    fn list_active(&self) -> RepoResult<Vec<AttributeDefinition>> {
        query_all(
            self.conn,
            &format!("{DEFINITION_SELECT_SQL} WHERE active = 1{DEFINITION_ORDER_SQL};"),
        )
    }
}

/// Loads every definition whose id is in `ids`, one statement per
/// `IN_LIST_CHUNK` ids.
///
/// Unknown ids are silently absent from the result.
pub fn load_definitions_by_ids(
    conn: &Connection,
    ids: &[AttributeId],
) -> RepoResult<Vec<AttributeDefinition>> {
    let mut definitions = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_LIST_CHUNK) {
        let (placeholders, binds) = in_list(chunk);
        let mut stmt = conn.prepare(&format!(
            "{DEFINITION_SELECT_SQL} WHERE id IN ({placeholders});"
        ))?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        while let Some(row) = rows.next()? {
            definitions.push(parse_definition_row(row)?);
        }
    }
    Ok(definitions)
}

fn query_optional(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> RepoResult<Option<AttributeDefinition>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([key])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_definition_row(row)?));
    }
    Ok(None)
}

fn query_all(conn: &Connection, sql: &str) -> RepoResult<Vec<AttributeDefinition>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut definitions = Vec::new();
    while let Some(row) = rows.next()? {
        definitions.push(parse_definition_row(row)?);
    }
    Ok(definitions)
}

fn parse_definition_row(row: &Row<'_>) -> RepoResult<AttributeDefinition> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "attribute_definitions.id")?;

    let type_text: String = row.get("value_type")?;
    let value_type = ValueType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid value type `{type_text}` in attribute_definitions.value_type"
        ))
    })?;

    let enum_options = match row.get::<_, Option<String>>("enum_options")? {
        Some(json) => Some(serde_json::from_str::<Vec<String>>(&json).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid enum options `{json}` in attribute_definitions.enum_options: {err}"
            ))
        })?),
        None => None,
    };

    let definition = AttributeDefinition {
        id,
        display_label: row.get("display_label")?,
        wire_name: row.get("wire_name")?,
        value_type,
        enum_options,
        required: int_to_bool(row.get("required")?, "attribute_definitions.required")?,
        active: int_to_bool(row.get("active")?, "attribute_definitions.active")?,
        display_order: row.get("display_order")?,
    };
    definition.validate().map_err(|err| {
        RepoError::InvalidData(format!(
            "attribute definition `{}` violates invariants: {err}",
            definition.wire_name
        ))
    })?;
    Ok(definition)
}

fn encode_options(options: Option<&[String]>) -> RepoResult<Option<String>> {
    options
        .map(|options| {
            serde_json::to_string(options)
                .map_err(|err| RepoError::InvalidData(format!("cannot encode enum options: {err}")))
        })
        .transpose()
}
