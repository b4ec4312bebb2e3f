//! Record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the record aggregate into `records` + `attribute_values` (EAV).
//! - Load attribute values for many records without per-row lookups.
//!
//! # Invariants
//! - `save_record` replaces the full value set in a single transaction.
//! - Values never outlive their record (`ON DELETE CASCADE`).
//! - Definitions referenced by values are resolved with one `IN` query.

use crate::model::attribute::AttributeId;
use crate::model::record::{AttributeValue, Record, RecordId, RecordParts};
use crate::repo::attribute_repo::load_definitions_by_ids;
use crate::repo::{in_list, parse_uuid, RepoError, RepoResult, IN_LIST_CHUNK};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{BTreeSet, HashMap};

/// Repository interface for record persistence.
pub trait RecordRepository {
    /// Inserts or replaces the record and its complete value set.
    fn save_record(&self, record: &Record) -> RepoResult<()>;
    fn get_record(&self, id: RecordId) -> RepoResult<Option<Record>>;
    fn delete_record(&self, id: RecordId) -> RepoResult<()>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn save_record(&self, record: &Record) -> RepoResult<()> {
        let record_id = record.id().to_string();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO records (id, name, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                updated_at = excluded.updated_at;",
            params![
                record_id.as_str(),
                record.name(),
                record.email(),
                record.created_at(),
                record.updated_at(),
            ],
        )?;

        tx.execute(
            "DELETE FROM attribute_values WHERE record_id = ?1;",
            [record_id.as_str()],
        )?;

        for value in record.all_attribute_values() {
            tx.execute(
                "INSERT INTO attribute_values (id, record_id, definition_id, value)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    value.id.to_string(),
                    record_id.as_str(),
                    value.definition_id.to_string(),
                    value.raw_value.as_deref(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_record(&self, id: RecordId) -> RepoResult<Option<Record>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, created_at, updated_at
             FROM records
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let id_text: String = row.get("id")?;
        let record_id = parse_uuid(&id_text, "records.id")?;
        let mut values = load_values_for_records(self.conn, &[record_id])?;
        let values = values.remove(&record_id).unwrap_or_default();
        let values = attach_wire_names(self.conn, values)?;

        Ok(Some(Record::reconstitute(RecordParts {
            id: record_id,
            name: row.get("name")?,
            email: row.get("email")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            values,
        })))
    }

    fn delete_record(&self, id: RecordId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

/// Loads the attribute values of every record in `record_ids`, one query
/// per `IN_LIST_CHUNK` ids.
pub(crate) fn load_values_for_records(
    conn: &Connection,
    record_ids: &[RecordId],
) -> RepoResult<HashMap<RecordId, Vec<AttributeValue>>> {
    let mut grouped: HashMap<RecordId, Vec<AttributeValue>> = HashMap::new();
    for chunk in record_ids.chunks(IN_LIST_CHUNK) {
        let (placeholders, binds) = in_list(chunk);
        let mut stmt = conn.prepare(&format!(
            "SELECT id, record_id, definition_id, value
             FROM attribute_values
             WHERE record_id IN ({placeholders});"
        ))?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let record_text: String = row.get("record_id")?;
            let definition_text: String = row.get("definition_id")?;
            let value = AttributeValue {
                id: parse_uuid(&id_text, "attribute_values.id")?,
                record_id: parse_uuid(&record_text, "attribute_values.record_id")?,
                definition_id: parse_uuid(&definition_text, "attribute_values.definition_id")?,
                raw_value: row.get("value")?,
            };
            grouped.entry(value.record_id).or_default().push(value);
        }
    }
    Ok(grouped)
}

/// Distinct definition ids referenced by `values`, in stable order.
pub(crate) fn referenced_definition_ids<'a>(
    values: impl IntoIterator<Item = &'a AttributeValue>,
) -> Vec<AttributeId> {
    values
        .into_iter()
        .map(|value| value.definition_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn attach_wire_names(
    conn: &Connection,
    values: Vec<AttributeValue>,
) -> RepoResult<Vec<(String, AttributeValue)>> {
    let ids = referenced_definition_ids(&values);
    let wire_names = load_definitions_by_ids(conn, &ids)?
        .into_iter()
        .map(|definition| (definition.id, definition.wire_name))
        .collect::<HashMap<_, _>>();

    values
        .into_iter()
        .map(|value| {
            let wire_name = wire_names.get(&value.definition_id).cloned().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "attribute value `{}` references unknown definition `{}`",
                    value.id, value.definition_id
                ))
            })?;
            Ok((wire_name, value))
        })
        .collect()
}
