//! Attribute catalog use-case service.
//!
//! # Responsibility
//! - Create, read, list and (de)activate attribute definitions.
//!
//! # Invariants
//! - Wire names are unique across active and inactive definitions.
//! - A definition's wire name and value type never change after creation.
//! - Deactivation keeps the row so historical values still resolve.

use crate::model::attribute::{
    AttributeDefinition, AttributeId, AttributeValidationError, NewAttributeDefinition,
};
use crate::repo::attribute_repo::AttributeRepository;
use crate::repo::RepoError;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CatalogServiceResult<T> = Result<T, CatalogServiceError>;

#[derive(Debug)]
pub enum CatalogServiceError {
    Validation(AttributeValidationError),
    DuplicateWireName(String),
    DefinitionNotFound(AttributeId),
    Repo(RepoError),
}

impl Display for CatalogServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateWireName(wire_name) => {
                write!(f, "wire name `{wire_name}` is already defined")
            }
            Self::DefinitionNotFound(id) => write!(f, "attribute definition not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CatalogServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::DuplicateWireName(_) => None,
            Self::DefinitionNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<AttributeValidationError> for CatalogServiceError {
    fn from(value: AttributeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for CatalogServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::DefinitionNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Use-case service for attribute definitions.
pub struct CatalogService<R: AttributeRepository> {
    repo: R,
}

impl<R: AttributeRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validates and stores a new definition.
    pub fn create_definition(
        &self,
        request: NewAttributeDefinition,
    ) -> CatalogServiceResult<AttributeDefinition> {
        let definition = AttributeDefinition::new(request)?;
        if self.repo.find_by_wire_name(&definition.wire_name)?.is_some() {
            return Err(CatalogServiceError::DuplicateWireName(
                definition.wire_name.clone(),
            ));
        }

        self.repo.create_definition(&definition)?;
        info!(
            "event=definition_create module=catalog status=ok value_type={}",
            definition.value_type
        );
        Ok(definition)
    }

    pub fn get_definition(&self, id: AttributeId) -> CatalogServiceResult<AttributeDefinition> {
        self.repo
            .get_definition(id)?
            .ok_or(CatalogServiceError::DefinitionNotFound(id))
    }

    pub fn list_definitions(&self) -> CatalogServiceResult<Vec<AttributeDefinition>> {
        Ok(self.repo.list_definitions()?)
    }

    pub fn list_active(&self) -> CatalogServiceResult<Vec<AttributeDefinition>> {
        Ok(self.repo.list_active()?)
    }

    /// Excludes the definition from write paths; existing values stay.
    pub fn deactivate(&self, id: AttributeId) -> CatalogServiceResult<AttributeDefinition> {
        self.set_active(id, false)
    }

    pub fn activate(&self, id: AttributeId) -> CatalogServiceResult<AttributeDefinition> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: AttributeId, active: bool) -> CatalogServiceResult<AttributeDefinition> {
        let mut definition = self.get_definition(id)?;
        if definition.is_active() == active {
            return Ok(definition);
        }

        if active {
            definition.activate();
        } else {
            definition.deactivate();
        }
        self.repo.update_definition(&definition)?;
        info!("event=definition_update module=catalog status=ok active={active}");
        Ok(definition)
    }
}
