//! Logical search request and normalized result envelope.
//!
//! # Responsibility
//! - Describe one backend-neutral request: free text, filters, sort, page.
//! - Describe the envelope both backends are normalized into.
//!
//! # Invariants
//! - `page >= 1` and `page_size >= 1` after `validate()`.
//! - `between` carries a two-element range; every other operator one value.

use super::error::{EngineResult, SearchError};
use crate::catalog::AttributeCatalog;
use crate::model::attribute::ValueType;
use crate::model::record::RecordId;
use crate::model::value::{from_storage_form, InvalidValue, TypedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Storage backend a request is answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// EAV tables in the relational store.
    #[default]
    #[serde(alias = "mysql", alias = "RELATIONAL")]
    Relational,
    /// Flattened documents in the search index.
    #[serde(alias = "es", alias = "INDEXED")]
    Indexed,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Indexed => "indexed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relational" | "mysql" => Some(Self::Relational),
            "indexed" | "es" => Some(Self::Indexed),
            _ => None,
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed record attributes addressable by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedField {
    Name,
    Email,
    CreatedAt,
    UpdatedAt,
}

impl FixedField {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "createdAt" | "created_at" => Some(Self::CreatedAt),
            "updatedAt" | "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
        }
    }

    /// Column name shared by `records` and `documents`.
    pub fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Timestamps are integer epoch milliseconds; the rest is text.
    pub fn is_timestamp(self) -> bool {
        matches!(self, Self::CreatedAt | Self::UpdatedAt)
    }
}

/// Either a fixed field or a dynamic attribute wire name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttributePath {
    Fixed(FixedField),
    Dynamic(String),
}

impl AttributePath {
    pub fn parse(value: &str) -> Self {
        match FixedField::parse(value) {
            Some(field) => Self::Fixed(field),
            None => Self::Dynamic(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Fixed(field) => field.as_str(),
            Self::Dynamic(wire_name) => wire_name,
        }
    }
}

impl From<String> for AttributePath {
    fn from(value: String) -> Self {
        match FixedField::parse(&value) {
            Some(field) => Self::Fixed(field),
            None => Self::Dynamic(value),
        }
    }
}

impl From<&str> for AttributePath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<AttributePath> for String {
    fn from(value: AttributePath) -> Self {
        match value {
            AttributePath::Fixed(field) => field.as_str().to_string(),
            AttributePath::Dynamic(wire_name) => wire_name,
        }
    }
}

impl Display for AttributePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
    Between,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Between => "between",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "contains" => Some(Self::Contains),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "between" => Some(Self::Between),
            _ => None,
        }
    }

    /// SQL comparison for the ordering operators.
    pub(crate) fn comparison(self) -> Option<&'static str> {
        match self {
            Self::Gt => Some(">"),
            Self::Lt => Some("<"),
            Self::Gte => Some(">="),
            Self::Lte => Some("<="),
            Self::Eq | Self::Contains | Self::Between => None,
        }
    }
}

impl Display for FilterOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scalar operand as sent by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterBound {
    Number(f64),
    Text(String),
}

impl FilterBound {
    /// Operand as typed under `value_type`.
    ///
    /// Text operands go through the storage parser so `"90"` and `90`
    /// compare the same way.
    pub fn coerce(&self, value_type: ValueType) -> Result<TypedValue, InvalidValue> {
        match (self, value_type) {
            (Self::Number(number), ValueType::Number) => {
                if number.is_finite() {
                    Ok(TypedValue::Number(*number))
                } else {
                    Err(InvalidValue::new(
                        value_type,
                        number.to_string(),
                        "number must be finite",
                    ))
                }
            }
            (Self::Number(number), ValueType::Text) => Ok(TypedValue::Text(number.to_string())),
            (Self::Number(number), ValueType::Enum) => Ok(TypedValue::Enum(number.to_string())),
            (Self::Number(number), ValueType::Date) => Err(InvalidValue::new(
                value_type,
                number.to_string(),
                "expected a calendar date",
            )),
            (Self::Text(raw), _) => from_storage_form(value_type, raw),
        }
    }

    /// Operand as plain text, for substring tests.
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.clone(),
        }
    }

    /// Operand as a timestamp in epoch milliseconds.
    pub fn as_timestamp(&self) -> Result<f64, InvalidValue> {
        let value = match self {
            Self::Number(number) => *number,
            Self::Text(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|err| InvalidValue::new(ValueType::Number, raw.as_str(), err.to_string()))?,
        };
        if !value.is_finite() {
            return Err(InvalidValue::new(
                ValueType::Number,
                value.to_string(),
                "number must be finite",
            ));
        }
        Ok(value)
    }
}

impl From<f64> for FilterBound {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FilterBound {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterBound {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Filter operand: one bound, or an inclusive `[low, high]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Range(FilterBound, FilterBound),
    Single(FilterBound),
}

impl FilterValue {
    pub fn single(value: impl Into<FilterBound>) -> Self {
        Self::Single(value.into())
    }

    pub fn range(low: impl Into<FilterBound>, high: impl Into<FilterBound>) -> Self {
        Self::Range(low.into(), high.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(alias = "field")]
    pub attribute_path: AttributePath,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl Filter {
    pub fn new(
        attribute_path: impl Into<AttributePath>,
        operator: FilterOperator,
        value: FilterValue,
    ) -> Self {
        Self {
            attribute_path: attribute_path.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortTerm {
    #[serde(alias = "field")]
    pub attribute_path: AttributePath,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortTerm {
    pub fn new(attribute_path: impl Into<AttributePath>, direction: SortDirection) -> Self {
        Self {
            attribute_path: attribute_path.into(),
            direction,
        }
    }
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// One logical request, answerable by either backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default, alias = "dataSource")]
    pub backend: Backend,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default, alias = "search", skip_serializing_if = "Option::is_none")]
    pub free_text: Option<String>,
    #[serde(default, alias = "filter")]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Vec<SortTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<AttributePath>,
}

impl SearchQuery {
    /// Creates a first-page query with the default page size.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            free_text: None,
            filters: Vec::new(),
            sort: Vec::new(),
            group_by: None,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn with_free_text(mut self, text: impl Into<String>) -> Self {
        self.free_text = Some(text.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sort(mut self, term: SortTerm) -> Self {
        self.sort.push(term);
        self
    }

    pub fn with_group_by(mut self, path: impl Into<AttributePath>) -> Self {
        self.group_by = Some(path.into());
        self
    }

    /// Trimmed free text, `None` when blank.
    pub fn free_text(&self) -> Option<&str> {
        self.free_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.page < 1 {
            return Err(SearchError::InvalidQuery(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        if self.page_size < 1 {
            return Err(SearchError::InvalidQuery(format!(
                "pageSize must be >= 1, got {}",
                self.page_size
            )));
        }

        for filter in &self.filters {
            match (filter.operator, &filter.value) {
                (FilterOperator::Between, FilterValue::Range(..)) => {}
                (FilterOperator::Between, FilterValue::Single(_)) => {
                    return Err(SearchError::InvalidQuery(format!(
                        "`between` on `{}` requires a two-element range",
                        filter.attribute_path
                    )));
                }
                (operator, FilterValue::Range(..)) => {
                    return Err(SearchError::InvalidQuery(format!(
                        "`{operator}` on `{}` takes a single value, not a range",
                        filter.attribute_path
                    )));
                }
                (_, FilterValue::Single(_)) => {}
            }
        }
        Ok(())
    }

    /// Rows skipped before the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One record in the result envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProjection {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub custom_fields: BTreeMap<String, TypedValue>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Count of filtered records sharing one value of the `groupBy` path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: u64,
}

/// Non-fatal notes about how a request was interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryWarning {
    /// Path is neither a fixed field nor a catalog wire name.
    UnknownAttribute { path: String },
    /// Sort term the backend cannot honor; it was skipped.
    UnsupportedSort { path: String },
    /// Filter operator the backend does not forward; the filter was skipped.
    UnsupportedOperator {
        path: String,
        operator: FilterOperator,
    },
}

/// Normalized response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub records: Vec<RecordProjection>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
    pub elapsed_millis: u64,
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<GroupCount>>,
    pub warnings: Vec<QueryWarning>,
}

/// Raw page returned by a backend before the envelope is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendPage {
    pub records: Vec<RecordProjection>,
    pub total: u64,
    pub groups: Option<Vec<GroupCount>>,
    pub warnings: Vec<QueryWarning>,
}

impl BackendPage {
    pub(crate) fn warn(&mut self, warning: QueryWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// One executable backend.
pub trait SearchBackend: Send + Sync {
    fn backend(&self) -> Backend;
    fn execute(&self, catalog: &AttributeCatalog, query: &SearchQuery) -> EngineResult<BackendPage>;
}

/// Orders groups by count descending, then key ascending.
pub(crate) fn sort_groups(groups: &mut [GroupCount]) {
    groups.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then_with(|| left.key.cmp(&right.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_defaults_and_aliases() {
        let query: SearchQuery = serde_json::from_value(json!({
            "dataSource": "es",
            "search": "ada",
            "filter": [{ "field": "tier__c", "operator": "eq", "value": "gold" }],
            "sort": [{ "field": "created_at", "direction": "desc" }]
        }))
        .unwrap();

        assert_eq!(query.backend, Backend::Indexed);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 20);
        assert_eq!(query.free_text(), Some("ada"));
        assert_eq!(
            query.filters[0].attribute_path,
            AttributePath::Dynamic("tier__c".to_string())
        );
        assert_eq!(
            query.sort[0].attribute_path,
            AttributePath::Fixed(FixedField::CreatedAt)
        );
        assert_eq!(query.sort[0].direction, SortDirection::Desc);
    }

    #[test]
    fn between_range_deserializes_from_two_element_array() {
        let filter: Filter = serde_json::from_value(json!({
            "attributePath": "score__c",
            "operator": "between",
            "value": [10, "20"]
        }))
        .unwrap();
        assert_eq!(
            filter.value,
            FilterValue::Range(FilterBound::Number(10.0), FilterBound::Text("20".to_string()))
        );
    }

    #[test]
    fn validate_rejects_zero_page_and_malformed_ranges() {
        let zero_page = SearchQuery::new(Backend::Relational).with_page(0, 20);
        assert!(matches!(zero_page.validate(), Err(SearchError::InvalidQuery(_))));

        let zero_size = SearchQuery::new(Backend::Relational).with_page(1, 0);
        assert!(matches!(zero_size.validate(), Err(SearchError::InvalidQuery(_))));

        let single_between = SearchQuery::new(Backend::Relational).with_filter(Filter::new(
            "score__c",
            FilterOperator::Between,
            FilterValue::single(1.0),
        ));
        assert!(matches!(
            single_between.validate(),
            Err(SearchError::InvalidQuery(_))
        ));

        let ranged_eq = SearchQuery::new(Backend::Relational).with_filter(Filter::new(
            "score__c",
            FilterOperator::Eq,
            FilterValue::range(1.0, 2.0),
        ));
        assert!(matches!(ranged_eq.validate(), Err(SearchError::InvalidQuery(_))));
    }

    #[test]
    fn offset_follows_page_and_size() {
        assert_eq!(SearchQuery::new(Backend::Indexed).offset(), 0);
        assert_eq!(
            SearchQuery::new(Backend::Indexed).with_page(3, 25).offset(),
            50
        );
    }

    #[test]
    fn text_bound_coerces_through_storage_parser() {
        assert_eq!(
            FilterBound::from("90").coerce(ValueType::Number).unwrap(),
            TypedValue::Number(90.0)
        );
        assert!(FilterBound::Number(5.0).coerce(ValueType::Date).is_err());
        assert!(FilterBound::from("soon").coerce(ValueType::Date).is_err());
    }

    #[test]
    fn warnings_serialize_with_kind_tag() {
        let warning = QueryWarning::UnsupportedOperator {
            path: "score__c".to_string(),
            operator: FilterOperator::Gt,
        };
        assert_eq!(
            serde_json::to_value(&warning).unwrap(),
            json!({ "kind": "unsupportedOperator", "path": "score__c", "operator": "gt" })
        );
    }

    #[test]
    fn groups_sort_by_count_then_key() {
        let mut groups = vec![
            GroupCount { key: "silver".to_string(), count: 1 },
            GroupCount { key: "gold".to_string(), count: 2 },
            GroupCount { key: "bronze".to_string(), count: 1 },
        ];
        sort_groups(&mut groups);
        let keys = groups.iter().map(|group| group.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["gold", "bronze", "silver"]);
    }
}
