//! Document-index query path.
//!
//! # Responsibility
//! - Translate a `SearchQuery` into SQL over flattened `documents`.
//! - Use the trigram FTS5 table for free text of three or more characters.
//!
//! # Invariants
//! - Only `eq` filters are forwarded; other operators are skipped with a
//!   warning naming the filter.
//! - Unknown dynamic fields are forwarded; absent fields match nothing.
//! - Documents with a missing sort field order after those that have it.
//! - `id ASC` is always the last sort key.

use super::error::{EngineResult, SearchError};
use super::query::{
    sort_groups, AttributePath, Backend, BackendPage, FilterBound, FilterOperator, FilterValue,
    GroupCount, QueryWarning, RecordProjection, SearchBackend, SearchQuery,
};
use super::relational::{offset_value, push_fixed_predicate, push_free_text};
use crate::catalog::AttributeCatalog;
use crate::db::DbError;
use crate::index::{open_index_existing, parse_document_row, IndexDocument};
use crate::model::value::{to_storage_form, TypedValue};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Shortest free text the trigram tokenizer can match.
const TRIGRAM_MIN_CHARS: usize = 3;

/// Indexed backend bound to one index database file.
#[derive(Debug, Clone)]
pub struct IndexedBackend {
    index_path: PathBuf,
}

impl IndexedBackend {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
        }
    }
}

impl SearchBackend for IndexedBackend {
    fn backend(&self) -> Backend {
        Backend::Indexed
    }

    fn execute(&self, catalog: &AttributeCatalog, query: &SearchQuery) -> EngineResult<BackendPage> {
        let conn = open_index_existing(&self.index_path)
            .map_err(|err| SearchError::unavailable(Backend::Indexed, err))?;
        run_indexed_search(&conn, catalog, query).map_err(|err| err.classify(Backend::Indexed))
    }
}

/// Runs `query` against an open index connection.
pub fn run_indexed_search(
    conn: &Connection,
    catalog: &AttributeCatalog,
    query: &SearchQuery,
) -> EngineResult<BackendPage> {
    let mut page = BackendPage::default();
    let mut where_sql = String::from(" WHERE 1 = 1");
    let mut binds: Vec<Value> = Vec::new();
    let mut match_expr = None;

    if let Some(text) = query.free_text() {
        if text.chars().count() >= TRIGRAM_MIN_CHARS {
            let expr = escape_fts_phrase(text);
            where_sql.push_str(
                " AND d.doc_rowid IN (SELECT rowid FROM documents_fts WHERE documents_fts MATCH ?)",
            );
            binds.push(Value::Text(expr.clone()));
            match_expr = Some(expr);
        } else {
            push_free_text(&mut where_sql, &mut binds, "d", text);
        }
    }

    for filter in &query.filters {
        if filter.operator != FilterOperator::Eq {
            page.warn(QueryWarning::UnsupportedOperator {
                path: filter.attribute_path.to_string(),
                operator: filter.operator,
            });
            continue;
        }
        let FilterValue::Single(bound) = &filter.value else {
            return Err(SearchError::InvalidQuery(format!(
                "`eq` on `{}` takes a single value, not a range",
                filter.attribute_path
            )));
        };

        match &filter.attribute_path {
            AttributePath::Fixed(field) => {
                push_fixed_predicate(&mut where_sql, &mut binds, "d", *field, filter)?;
            }
            AttributePath::Dynamic(wire_name) => {
                let operand = match catalog.resolve(wire_name) {
                    Some(definition) => typed_operand(bound.coerce(definition.value_type)?),
                    None => {
                        page.warn(QueryWarning::UnknownAttribute {
                            path: wire_name.clone(),
                        });
                        untyped_operand(bound)
                    }
                };
                match json_path(wire_name) {
                    Some(path) => {
                        where_sql.push_str(" AND json_extract(d.custom_fields, ?) = ?");
                        binds.push(Value::Text(path));
                        binds.push(operand);
                    }
                    None => where_sql.push_str(" AND 0 = 1"),
                }
            }
        }
    }

    page.total = count_documents(conn, &where_sql, &binds, match_expr.as_deref())?;

    let mut order_terms = Vec::new();
    let mut order_binds = Vec::new();
    for term in &query.sort {
        match &term.attribute_path {
            AttributePath::Fixed(field) => {
                order_terms.push(format!("d.{} {}", field.column(), term.direction.sql()));
            }
            AttributePath::Dynamic(wire_name) => {
                if catalog.resolve(wire_name).is_none() {
                    page.warn(QueryWarning::UnknownAttribute {
                        path: wire_name.clone(),
                    });
                }
                let Some(path) = json_path(wire_name) else {
                    continue;
                };
                order_terms.push(format!(
                    "json_extract(d.custom_fields, ?) {} NULLS LAST",
                    term.direction.sql()
                ));
                order_binds.push(Value::Text(path));
            }
        }
    }
    if order_terms.is_empty() {
        order_terms.push("d.created_at DESC".to_string());
    }
    order_terms.push("d.id ASC".to_string());

    let sql = format!(
        "SELECT d.id, d.name, d.email, d.created_at, d.updated_at, d.custom_fields
         FROM documents d{where_sql}
         ORDER BY {}
         LIMIT ? OFFSET ?;",
        order_terms.join(", ")
    );
    let mut page_binds = binds.clone();
    page_binds.extend(order_binds);
    page_binds.push(Value::Integer(i64::from(query.page_size)));
    page_binds.push(Value::Integer(offset_value(query)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(page_binds))
        .map_err(|err| map_query_error(err, match_expr.as_deref()))?;
    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, match_expr.as_deref()))?
    {
        let document = parse_document_row(row)?;
        page.records.push(project_document(document, catalog)?);
    }

    if let Some(path) = &query.group_by {
        if let AttributePath::Dynamic(wire_name) = path {
            if catalog.resolve(wire_name).is_none() {
                page.warn(QueryWarning::UnknownAttribute {
                    path: wire_name.clone(),
                });
            }
        }
        let groups = group_counts(conn, path, &where_sql, &binds, match_expr.as_deref())?;
        page.groups = Some(groups);
    }

    debug!(
        "event=indexed_query module=search status=ok filters={} total={} returned={} fts={}",
        query.filters.len(),
        page.total,
        page.records.len(),
        match_expr.is_some()
    );
    Ok(page)
}

/// JSON path of one flattened field; `None` when the name cannot be quoted.
fn json_path(wire_name: &str) -> Option<String> {
    if wire_name.contains('"') || wire_name.contains('\\') {
        return None;
    }
    Some(format!("$.\"{wire_name}\""))
}

fn typed_operand(value: TypedValue) -> Value {
    match value {
        TypedValue::Number(number) => Value::Real(number),
        other => Value::Text(to_storage_form(&other)),
    }
}

fn untyped_operand(bound: &FilterBound) -> Value {
    match bound {
        FilterBound::Number(number) => Value::Real(*number),
        FilterBound::Text(text) => Value::Text(text.clone()),
    }
}

fn count_documents(
    conn: &Connection,
    where_sql: &str,
    binds: &[Value],
    match_expr: Option<&str>,
) -> EngineResult<u64> {
    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM documents d{where_sql};"),
            params_from_iter(binds.iter()),
            |row| row.get(0),
        )
        .map_err(|err| map_query_error(err, match_expr))?;
    Ok(u64::try_from(total).unwrap_or(0))
}

/// Maps a flattened document onto the record shape, typed via the catalog.
///
/// Fields unknown to the catalog keep their JSON type: numbers stay
/// numbers, strings become text.
fn project_document(
    document: IndexDocument,
    catalog: &AttributeCatalog,
) -> EngineResult<RecordProjection> {
    let mut custom_fields = BTreeMap::new();
    for (wire_name, value) in document.custom_fields {
        let typed = match catalog.resolve(&wire_name) {
            Some(definition) => TypedValue::from_json(definition.value_type, &value)
                .map_err(|err| {
                    SearchError::InvalidData(format!(
                        "document `{}` field `{wire_name}`: {err}",
                        document.id
                    ))
                })?,
            None => infer_json_value(&value),
        };
        if let Some(typed) = typed {
            custom_fields.insert(wire_name, typed);
        }
    }

    Ok(RecordProjection {
        id: document.id,
        name: document.name,
        email: document.email,
        custom_fields,
        created_at: document.created_at,
        updated_at: document.updated_at,
    })
}

fn infer_json_value(value: &JsonValue) -> Option<TypedValue> {
    match value {
        JsonValue::Number(number) => number.as_f64().map(TypedValue::Number),
        JsonValue::String(text) => Some(TypedValue::Text(text.clone())),
        JsonValue::Bool(flag) => Some(TypedValue::Text(flag.to_string())),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn group_counts(
    conn: &Connection,
    path: &AttributePath,
    where_sql: &str,
    binds: &[Value],
    match_expr: Option<&str>,
) -> EngineResult<Vec<GroupCount>> {
    let (sql, group_binds) = match path {
        AttributePath::Fixed(field) => (
            format!(
                "SELECT CAST(d.{column} AS TEXT) AS group_key, COUNT(*) AS group_count
                 FROM documents d{where_sql}
                 GROUP BY d.{column};",
                column = field.column()
            ),
            binds.to_vec(),
        ),
        AttributePath::Dynamic(wire_name) => {
            let Some(json_path) = json_path(wire_name) else {
                return Ok(Vec::new());
            };
            let mut group_binds = vec![Value::Text(json_path.clone())];
            group_binds.extend(binds.iter().cloned());
            group_binds.push(Value::Text(json_path));
            (
                format!(
                    "SELECT json_extract(d.custom_fields, ?) AS group_key, COUNT(*) AS group_count
                     FROM documents d{where_sql}
                       AND json_extract(d.custom_fields, ?) IS NOT NULL
                     GROUP BY group_key;"
                ),
                group_binds,
            )
        }
    };

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(group_binds))
        .map_err(|err| map_query_error(err, match_expr))?;
    let mut groups = Vec::new();
    while let Some(row) = rows.next().map_err(|err| map_query_error(err, match_expr))? {
        let key: Value = row.get("group_key")?;
        let count: i64 = row.get("group_count")?;
        let key = match key {
            Value::Null => continue,
            Value::Integer(number) => number.to_string(),
            // Same text form the relational store keeps, so keys line up.
            Value::Real(number) => to_storage_form(&TypedValue::Number(number)),
            Value::Text(text) => text,
            Value::Blob(_) => {
                return Err(SearchError::InvalidData(
                    "blob group key in documents.custom_fields".to_string(),
                ))
            }
        };
        groups.push(GroupCount {
            key,
            count: u64::try_from(count).unwrap_or(0),
        });
    }
    sort_groups(&mut groups);
    Ok(groups)
}

/// Quotes free text as one FTS5 phrase so user input is never parsed as
/// query syntax.
fn escape_fts_phrase(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, match_expr: Option<&str>) -> SearchError {
    if let Some(expr) = match_expr {
        if is_match_syntax_error(&err) {
            return SearchError::InvalidQuery(format!(
                "invalid full-text query `{expr}`: {err}"
            ));
        }
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_fts_phrase, json_path};

    #[test]
    fn fts_phrase_doubles_embedded_quotes() {
        assert_eq!(escape_fts_phrase("ada"), "\"ada\"");
        assert_eq!(escape_fts_phrase("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn json_path_quotes_wire_names() {
        assert_eq!(json_path("tier__c").as_deref(), Some("$.\"tier__c\""));
        assert_eq!(json_path("bad\"name"), None);
    }
}
