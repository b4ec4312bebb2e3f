//! Record write-path service.
//!
//! # Responsibility
//! - Create, update, read and delete records with typed attribute input.
//! - Emit the `SyncEvent` that carries each write to the document index.
//!
//! # Invariants
//! - Attribute input is keyed by wire name and coerced per value type.
//! - Unknown wire names are rejected; inactive ones fail in the aggregate.
//! - Every active required attribute holds a value after a write.

use crate::catalog::AttributeCatalog;
use crate::index::{IndexDocument, SyncEvent};
use crate::model::record::{
    current_epoch_ms, FixedAttributes, Record, RecordError, RecordId, RecordValidationError,
};
use crate::model::value::{from_storage_form, InvalidValue};
use crate::repo::attribute_repo::AttributeRepository;
use crate::repo::record_repo::RecordRepository;
use crate::repo::RepoError;
use log::info;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RecordServiceResult<T> = Result<T, RecordServiceError>;

#[derive(Debug)]
pub enum RecordServiceError {
    Record(RecordError),
    UnknownAttribute(String),
    MissingRequired(String),
    RecordNotFound(RecordId),
    Repo(RepoError),
}

impl Display for RecordServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(err) => write!(f, "{err}"),
            Self::UnknownAttribute(wire_name) => write!(f, "unknown attribute `{wire_name}`"),
            Self::MissingRequired(wire_name) => {
                write!(f, "required attribute `{wire_name}` has no value")
            }
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RecordServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Record(err) => Some(err),
            Self::UnknownAttribute(_) => None,
            Self::MissingRequired(_) => None,
            Self::RecordNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RecordError> for RecordServiceError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

impl From<RecordValidationError> for RecordServiceError {
    fn from(value: RecordValidationError) -> Self {
        Self::Record(RecordError::Validation(value))
    }
}

impl From<InvalidValue> for RecordServiceError {
    fn from(value: InvalidValue) -> Self {
        Self::Record(RecordError::InvalidValue(value))
    }
}

impl From<RepoError> for RecordServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::RecordNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Input for a new record. Attribute values are text, keyed by wire name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRecordRequest {
    pub name: String,
    pub email: String,
    pub custom_fields: BTreeMap<String, String>,
}

/// Partial update. `None` in `custom_fields` clears the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRecordRequest {
    pub name: Option<String>,
    pub custom_fields: BTreeMap<String, Option<String>>,
}

/// Use-case service for the record write path.
pub struct RecordService<R: RecordRepository, A: AttributeRepository> {
    records: R,
    attributes: A,
}

impl<R: RecordRepository, A: AttributeRepository> RecordService<R, A> {
    pub fn new(records: R, attributes: A) -> Self {
        Self {
            records,
            attributes,
        }
    }

    /// Creates and stores a record; returns it with its index upsert event.
    pub fn create_record(
        &self,
        request: &CreateRecordRequest,
    ) -> RecordServiceResult<(Record, SyncEvent)> {
        let catalog = self.load_catalog()?;
        let mut record = Record::create(FixedAttributes::new(
            request.name.as_str(),
            request.email.as_str(),
        ))?;

        for (wire_name, raw) in &request.custom_fields {
            apply_raw_value(&mut record, &catalog, wire_name, raw)?;
        }
        ensure_required(&record, &catalog)?;

        self.records.save_record(&record)?;
        let event = SyncEvent::upserted(IndexDocument::from_record(&record, &catalog)?);
        info!(
            "event=record_create module=service status=ok attributes={}",
            request.custom_fields.len()
        );
        Ok((record, event))
    }

    /// Applies a partial update; returns the new state and its upsert event.
    pub fn update_record(
        &self,
        id: RecordId,
        request: &UpdateRecordRequest,
    ) -> RecordServiceResult<(Record, SyncEvent)> {
        let catalog = self.load_catalog()?;
        let mut record = self.get_record(id)?;
        let now_ms = current_epoch_ms();

        if let Some(name) = &request.name {
            record.update_name(name, now_ms)?;
        }
        for (wire_name, raw) in &request.custom_fields {
            match raw {
                Some(raw) => apply_raw_value(&mut record, &catalog, wire_name, raw)?,
                None => {
                    if catalog.resolve(wire_name).is_none() {
                        return Err(RecordServiceError::UnknownAttribute(wire_name.clone()));
                    }
                    record.remove_attribute_value(wire_name);
                }
            }
        }
        ensure_required(&record, &catalog)?;
        record.touch(now_ms);

        self.records.save_record(&record)?;
        let event = SyncEvent::upserted(IndexDocument::from_record(&record, &catalog)?);
        info!(
            "event=record_update module=service status=ok attributes={}",
            request.custom_fields.len()
        );
        Ok((record, event))
    }

    pub fn get_record(&self, id: RecordId) -> RecordServiceResult<Record> {
        self.records
            .get_record(id)?
            .ok_or(RecordServiceError::RecordNotFound(id))
    }

    /// Deletes a record and its values; returns the index delete event.
    pub fn delete_record(&self, id: RecordId) -> RecordServiceResult<SyncEvent> {
        self.records.delete_record(id)?;
        info!("event=record_delete module=service status=ok");
        Ok(SyncEvent::deleted(id))
    }

    fn load_catalog(&self) -> RecordServiceResult<AttributeCatalog> {
        Ok(AttributeCatalog::new(self.attributes.list_definitions()?))
    }
}

fn apply_raw_value(
    record: &mut Record,
    catalog: &AttributeCatalog,
    wire_name: &str,
    raw: &str,
) -> RecordServiceResult<()> {
    let definition = catalog
        .resolve(wire_name)
        .ok_or_else(|| RecordServiceError::UnknownAttribute(wire_name.to_string()))?;
    let typed = from_storage_form(definition.value_type, raw)?;
    record.set_attribute_value(definition, typed)?;
    Ok(())
}

fn ensure_required(record: &Record, catalog: &AttributeCatalog) -> RecordServiceResult<()> {
    for definition in catalog.all_active() {
        if definition.required && record.get_attribute_value(definition.id).is_none() {
            return Err(RecordServiceError::MissingRequired(
                definition.wire_name.clone(),
            ));
        }
    }
    Ok(())
}
