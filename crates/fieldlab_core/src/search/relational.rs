//! Relational (EAV) query path.
//!
//! # Responsibility
//! - Translate a `SearchQuery` into SQL over `records` + `attribute_values`.
//! - Project each page into typed records with bulk value/definition loads.
//!
//! # Invariants
//! - Every dynamic filter is its own correlated `EXISTS`; filters never share
//!   a join.
//! - Dynamic sort terms are never joined in; they are skipped with a warning.
//! - `id ASC` is always the last sort key.
//! - One session per request, dropped on every exit path.

use super::error::{EngineResult, SearchError};
use super::query::{
    sort_groups, AttributePath, Backend, BackendPage, Filter, FilterBound, FilterOperator,
    FilterValue, FixedField, GroupCount, QueryWarning, RecordProjection, SearchBackend,
    SearchQuery,
};
use crate::catalog::AttributeCatalog;
use crate::db::{open_db_existing, FOLD_CASE_FN};
use crate::model::attribute::{AttributeDefinition, ValueType};
use crate::model::value::{from_storage_form, to_storage_form, TypedValue};
use crate::repo::attribute_repo::load_definitions_by_ids;
use crate::repo::parse_uuid;
use crate::repo::record_repo::{load_values_for_records, referenced_definition_ids};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Relational backend bound to one database file.
#[derive(Debug, Clone)]
pub struct RelationalBackend {
    db_path: PathBuf,
}

impl RelationalBackend {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl SearchBackend for RelationalBackend {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn execute(&self, catalog: &AttributeCatalog, query: &SearchQuery) -> EngineResult<BackendPage> {
        let conn = open_db_existing(&self.db_path)
            .map_err(|err| SearchError::unavailable(Backend::Relational, err))?;
        run_relational_search(&conn, catalog, query)
            .map_err(|err| err.classify(Backend::Relational))
    }
}

/// Runs `query` against an open relational connection.
pub fn run_relational_search(
    conn: &Connection,
    catalog: &AttributeCatalog,
    query: &SearchQuery,
) -> EngineResult<BackendPage> {
    let mut page = BackendPage::default();
    let mut where_sql = String::from(" WHERE 1 = 1");
    let mut binds: Vec<Value> = Vec::new();

    if let Some(text) = query.free_text() {
        push_free_text(&mut where_sql, &mut binds, "r", text);
    }

    for (index, filter) in query.filters.iter().enumerate() {
        match &filter.attribute_path {
            AttributePath::Fixed(field) => {
                push_fixed_predicate(&mut where_sql, &mut binds, "r", *field, filter)?;
            }
            AttributePath::Dynamic(wire_name) => match catalog.resolve(wire_name) {
                Some(definition) => {
                    push_exists_predicate(&mut where_sql, &mut binds, index, definition, filter)?;
                }
                None => page.warn(QueryWarning::UnknownAttribute {
                    path: wire_name.clone(),
                }),
            },
        }
    }

    page.total = count_records(conn, &where_sql, &binds)?;

    let mut order_terms = Vec::new();
    for term in &query.sort {
        match &term.attribute_path {
            AttributePath::Fixed(field) => {
                order_terms.push(format!("r.{} {}", field.column(), term.direction.sql()));
            }
            AttributePath::Dynamic(wire_name) => page.warn(QueryWarning::UnsupportedSort {
                path: wire_name.clone(),
            }),
        }
    }
    if order_terms.is_empty() {
        order_terms.push("r.created_at DESC".to_string());
    }
    order_terms.push("r.id ASC".to_string());

    let sql = format!(
        "SELECT r.id, r.name, r.email, r.created_at, r.updated_at
         FROM records r{where_sql}
         ORDER BY {}
         LIMIT ? OFFSET ?;",
        order_terms.join(", ")
    );
    let mut page_binds = binds.clone();
    page_binds.push(Value::Integer(i64::from(query.page_size)));
    page_binds.push(Value::Integer(offset_value(query)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(page_binds))?;
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        page.records.push(RecordProjection {
            id: parse_uuid(&id_text, "records.id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            custom_fields: BTreeMap::new(),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        });
    }

    attach_custom_fields(conn, &mut page.records)?;

    if let Some(path) = &query.group_by {
        let groups = group_counts(conn, catalog, path, &where_sql, &binds, &mut page)?;
        page.groups = Some(groups);
    }

    debug!(
        "event=relational_query module=search status=ok filters={} total={} returned={}",
        query.filters.len(),
        page.total,
        page.records.len()
    );
    Ok(page)
}

/// Escapes LIKE wildcards and wraps `text` for a substring match.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Pattern for matching against `fold_case(column)`.
fn folded_like_pattern(text: &str) -> String {
    like_pattern(&text.to_lowercase())
}

/// Case-insensitive `name`/`email` containment on `alias`, Unicode-aware.
pub(crate) fn push_free_text(where_sql: &mut String, binds: &mut Vec<Value>, alias: &str, text: &str) {
    where_sql.push_str(&format!(
        " AND ({FOLD_CASE_FN}({alias}.name) LIKE ? ESCAPE '\\' \
         OR {FOLD_CASE_FN}({alias}.email) LIKE ? ESCAPE '\\')"
    ));
    let pattern = folded_like_pattern(text);
    binds.push(Value::Text(pattern.clone()));
    binds.push(Value::Text(pattern));
}

pub(crate) fn offset_value(query: &SearchQuery) -> i64 {
    i64::try_from(query.offset()).unwrap_or(i64::MAX)
}

/// Applies a filter directly to a fixed column of `alias`.
///
/// Shared with the indexed path, whose `documents` table uses the same
/// column names.
pub(crate) fn push_fixed_predicate(
    where_sql: &mut String,
    binds: &mut Vec<Value>,
    alias: &str,
    field: FixedField,
    filter: &Filter,
) -> EngineResult<()> {
    let column = format!("{alias}.{}", field.column());
    let operand = |bound: &FilterBound| -> EngineResult<Value> {
        if field.is_timestamp() {
            Ok(Value::Real(bound.as_timestamp()?))
        } else {
            Ok(Value::Text(bound.as_text()))
        }
    };

    match (&filter.value, filter.operator) {
        (FilterValue::Single(bound), FilterOperator::Eq) => {
            where_sql.push_str(&format!(" AND {column} = ?"));
            binds.push(operand(bound)?);
        }
        (FilterValue::Single(bound), FilterOperator::Contains) => {
            where_sql.push_str(&format!(
                " AND {FOLD_CASE_FN}(CAST({column} AS TEXT)) LIKE ? ESCAPE '\\'"
            ));
            binds.push(Value::Text(folded_like_pattern(&bound.as_text())));
        }
        (FilterValue::Range(low, high), FilterOperator::Between) => {
            where_sql.push_str(&format!(" AND {column} BETWEEN ? AND ?"));
            binds.push(operand(low)?);
            binds.push(operand(high)?);
        }
        (FilterValue::Single(bound), operator) => {
            let comparison = operator.comparison().ok_or_else(|| malformed(filter))?;
            where_sql.push_str(&format!(" AND {column} {comparison} ?"));
            binds.push(operand(bound)?);
        }
        (FilterValue::Range(..), _) => return Err(malformed(filter)),
    }
    Ok(())
}

fn push_exists_predicate(
    where_sql: &mut String,
    binds: &mut Vec<Value>,
    index: usize,
    definition: &AttributeDefinition,
    filter: &Filter,
) -> EngineResult<()> {
    let alias = format!("v{index}");
    let numeric = definition.value_type == ValueType::Number;
    let value_expr = if numeric {
        format!("CAST({alias}.value AS REAL)")
    } else {
        format!("{alias}.value")
    };
    let ordered_operand = |bound: &FilterBound| -> EngineResult<Value> {
        let typed = bound.coerce(definition.value_type)?;
        Ok(match typed {
            TypedValue::Number(number) => Value::Real(number),
            other => Value::Text(to_storage_form(&other)),
        })
    };

    let predicate = match (&filter.value, filter.operator) {
        (FilterValue::Single(bound), FilterOperator::Eq) => {
            let typed = bound.coerce(definition.value_type)?;
            binds.push(Value::Text(definition.id.to_string()));
            binds.push(Value::Text(to_storage_form(&typed)));
            format!("{alias}.value = ?")
        }
        (FilterValue::Single(bound), FilterOperator::Contains) => {
            binds.push(Value::Text(definition.id.to_string()));
            binds.push(Value::Text(folded_like_pattern(&bound.as_text())));
            format!("{FOLD_CASE_FN}({alias}.value) LIKE ? ESCAPE '\\'")
        }
        (FilterValue::Range(low, high), FilterOperator::Between) => {
            let low = ordered_operand(low)?;
            let high = ordered_operand(high)?;
            binds.push(Value::Text(definition.id.to_string()));
            binds.push(low);
            binds.push(high);
            format!("{value_expr} BETWEEN ? AND ?")
        }
        (FilterValue::Single(bound), operator) => {
            let comparison = operator.comparison().ok_or_else(|| malformed(filter))?;
            let operand = ordered_operand(bound)?;
            binds.push(Value::Text(definition.id.to_string()));
            binds.push(operand);
            format!("{value_expr} {comparison} ?")
        }
        (FilterValue::Range(..), _) => return Err(malformed(filter)),
    };

    where_sql.push_str(&format!(
        " AND EXISTS (SELECT 1 FROM attribute_values {alias} \
         WHERE {alias}.record_id = r.id AND {alias}.definition_id = ? \
         AND {alias}.value IS NOT NULL AND {predicate})"
    ));
    Ok(())
}

fn malformed(filter: &Filter) -> SearchError {
    SearchError::InvalidQuery(format!(
        "operator `{}` does not accept the value given for `{}`",
        filter.operator, filter.attribute_path
    ))
}

fn count_records(conn: &Connection, where_sql: &str, binds: &[Value]) -> EngineResult<u64> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM records r{where_sql};"),
        params_from_iter(binds.iter()),
        |row| row.get(0),
    )?;
    Ok(u64::try_from(total).unwrap_or(0))
}

/// Fills `custom_fields` with one value query and one definition query.
fn attach_custom_fields(conn: &Connection, records: &mut [RecordProjection]) -> EngineResult<()> {
    if records.is_empty() {
        return Ok(());
    }

    let record_ids = records.iter().map(|record| record.id).collect::<Vec<_>>();
    let values = load_values_for_records(conn, &record_ids)?;
    let definition_ids = referenced_definition_ids(values.values().flatten());
    let definitions = load_definitions_by_ids(conn, &definition_ids)?
        .into_iter()
        .map(|definition| (definition.id, definition))
        .collect::<HashMap<_, _>>();

    for record in records.iter_mut() {
        let Some(record_values) = values.get(&record.id) else {
            continue;
        };
        for value in record_values {
            let Some(raw) = value.raw_value.as_deref() else {
                continue;
            };
            let definition = definitions.get(&value.definition_id).ok_or_else(|| {
                SearchError::InvalidData(format!(
                    "attribute value `{}` references unknown definition `{}`",
                    value.id, value.definition_id
                ))
            })?;
            let typed = from_storage_form(definition.value_type, raw).map_err(|err| {
                SearchError::InvalidData(format!(
                    "attribute value `{}` of `{}`: {err}",
                    value.id, definition.wire_name
                ))
            })?;
            record.custom_fields.insert(definition.wire_name.clone(), typed);
        }
    }
    Ok(())
}

fn group_counts(
    conn: &Connection,
    catalog: &AttributeCatalog,
    path: &AttributePath,
    where_sql: &str,
    binds: &[Value],
    page: &mut BackendPage,
) -> EngineResult<Vec<GroupCount>> {
    let (sql, group_binds) = match path {
        AttributePath::Fixed(field) => (
            format!(
                "SELECT CAST(r.{column} AS TEXT) AS group_key, COUNT(*) AS group_count
                 FROM records r{where_sql}
                 GROUP BY r.{column};",
                column = field.column()
            ),
            binds.to_vec(),
        ),
        AttributePath::Dynamic(wire_name) => {
            let Some(definition) = catalog.resolve(wire_name) else {
                page.warn(QueryWarning::UnknownAttribute {
                    path: wire_name.clone(),
                });
                return Ok(Vec::new());
            };
            let mut group_binds = vec![Value::Text(definition.id.to_string())];
            group_binds.extend(binds.iter().cloned());
            (
                format!(
                    "SELECT g.value AS group_key, COUNT(*) AS group_count
                     FROM records r
                     JOIN attribute_values g
                       ON g.record_id = r.id AND g.definition_id = ? AND g.value IS NOT NULL{where_sql}
                     GROUP BY g.value;"
                ),
                group_binds,
            )
        }
    };

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(group_binds))?;
    let mut groups = Vec::new();
    while let Some(row) = rows.next()? {
        let key: Option<String> = row.get("group_key")?;
        let count: i64 = row.get("group_count")?;
        if let Some(key) = key {
            groups.push(GroupCount {
                key,
                count: u64::try_from(count).unwrap_or(0),
            });
        }
    }
    sort_groups(&mut groups);
    Ok(groups)
}
