use super::IndexDocument;
use crate::model::record::RecordId;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use log::debug;
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value as JsonValue};

/// Write/read contract of the document index.
pub trait DocumentIndex {
    fn upsert_document(&self, document: &IndexDocument) -> RepoResult<()>;
    /// Returns whether a document was removed.
    fn delete_document(&self, id: RecordId) -> RepoResult<bool>;
    fn get_document(&self, id: RecordId) -> RepoResult<Option<IndexDocument>>;
}

/// SQLite-backed document index.
pub struct SqliteDocumentIndex<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentIndex<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentIndex for SqliteDocumentIndex<'_> {
    fn upsert_document(&self, document: &IndexDocument) -> RepoResult<()> {
        let custom_fields = serde_json::to_string(&document.custom_fields)
            .map_err(|err| RepoError::InvalidData(format!("cannot encode custom fields: {err}")))?;

        self.conn.execute(
            "INSERT INTO documents (id, name, email, created_at, updated_at, custom_fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                custom_fields = excluded.custom_fields;",
            params![
                document.id.to_string(),
                document.name.as_str(),
                document.email.as_str(),
                document.created_at,
                document.updated_at,
                custom_fields,
            ],
        )?;
        debug!(
            "event=index_upsert module=index status=ok fields={}",
            document.custom_fields.len()
        );
        Ok(())
    }

    fn delete_document(&self, id: RecordId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn get_document(&self, id: RecordId) -> RepoResult<Option<IndexDocument>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, email, created_at, updated_at, custom_fields
             FROM documents
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_document_row(row)?));
        }
        Ok(None)
    }
}

/// Decodes one `documents` row selected with the columns used above.
pub(crate) fn parse_document_row(row: &Row<'_>) -> RepoResult<IndexDocument> {
    let id_text: String = row.get("id")?;
    let fields_text: String = row.get("custom_fields")?;
    let custom_fields =
        serde_json::from_str::<Map<String, JsonValue>>(&fields_text).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid custom fields in documents.custom_fields: {err}"
            ))
        })?;

    Ok(IndexDocument {
        id: parse_uuid(&id_text, "documents.id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        custom_fields,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
