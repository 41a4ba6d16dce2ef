//! Index object descriptors.
//!
//! A descriptor is the indexable representation of a domain entity: the
//! entity type, an optional explicit identifier, and the field values the
//! index should store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DescriptorError;

/// The mapped, indexable representation of a domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// The kind of entity this descriptor was mapped from.
    pub entity_type: String,
    /// Explicit identifier of the entity, if the mapping provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Field values to index.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl IndexDescriptor {
    /// Create a descriptor with no identifier and no fields.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: None,
            fields: Map::new(),
        }
    }

    /// Set the explicit identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Check that the descriptor can be submitted for indexing.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.entity_type.trim().is_empty() {
            return Err(DescriptorError::EmptyEntityType);
        }

        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(DescriptorError::BlankIdentifier {
                    entity_type: self.entity_type.clone(),
                });
            }
        }

        Ok(())
    }

    /// The key an index stores this descriptor under, if it has an identifier.
    pub fn index_key(&self) -> Option<(String, String)> {
        self.id
            .as_ref()
            .map(|id| (self.entity_type.clone(), id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = IndexDescriptor::new("person")
            .with_id("7")
            .with_field("name", "Julian7");

        assert_eq!(descriptor.entity_type, "person");
        assert_eq!(descriptor.id.as_deref(), Some("7"));
        assert_eq!(descriptor.fields.get("name"), Some(&Value::from("Julian7")));
        assert!(descriptor.validate().is_ok());
        assert_eq!(
            descriptor.index_key(),
            Some(("person".to_string(), "7".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_empty_type_and_blank_id() {
        assert_eq!(
            IndexDescriptor::new("  ").validate(),
            Err(DescriptorError::EmptyEntityType)
        );
        assert!(matches!(
            IndexDescriptor::new("person").with_id("").validate(),
            Err(DescriptorError::BlankIdentifier { .. })
        ));
    }

    #[test]
    fn test_descriptor_without_id_has_no_key() {
        assert!(IndexDescriptor::new("person").index_key().is_none());
    }
}
