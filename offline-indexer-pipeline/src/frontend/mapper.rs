//! Entity to descriptor mapping.

use offline_indexer_shared::IndexDescriptor;
use serde_json::Value;

use crate::errors::MappingError;

/// Turns a raw entity into an index descriptor.
///
/// Entities arrive as the JSON value they serialize to.
pub trait EntityMapper: Send + Sync {
    /// Map an entity.
    ///
    /// # Returns
    ///
    /// * `Ok(IndexDescriptor)` - The indexable representation
    /// * `Err(MappingError)` - If the entity cannot be indexed
    fn to_descriptor(&self, entity: Value) -> Result<IndexDescriptor, MappingError>;
}

/// Maps JSON objects field for field, optionally lifting one field into the
/// descriptor identifier.
#[derive(Debug, Clone)]
pub struct JsonEntityMapper {
    entity_type: String,
    id_field: Option<String>,
}

impl JsonEntityMapper {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id_field: None,
        }
    }

    /// Use `field` as the identifier. It must hold a string or an integer.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = Some(field.into());
        self
    }

    fn identifier(&self, field: &str, value: Option<&Value>) -> Result<Option<String>, MappingError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(id)) => Ok(Some(id.clone())),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
            Some(other) => Err(MappingError::invalid_entity(format!(
                "{} field '{}' is not a string or integer: {}",
                self.entity_type, field, other
            ))),
        }
    }
}

impl EntityMapper for JsonEntityMapper {
    fn to_descriptor(&self, entity: Value) -> Result<IndexDescriptor, MappingError> {
        let Value::Object(fields) = entity else {
            return Err(MappingError::invalid_entity(format!(
                "{} entity is not an object",
                self.entity_type
            )));
        };

        let id = match &self.id_field {
            Some(field) => self.identifier(field, fields.get(field))?,
            None => None,
        };

        Ok(IndexDescriptor {
            entity_type: self.entity_type.clone(),
            id,
            fields,
        })
    }
}
