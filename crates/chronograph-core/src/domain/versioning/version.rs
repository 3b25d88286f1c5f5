//! Immutable version records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change::{ChangeType, ElementType};
use super::payload::{DataMap, ElementPayload, RelationshipData};

/// One immutable, timestamped snapshot of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version<P> {
    /// ID of the element or relationship
    pub entity_id: String,
    /// Sequential version number, starting at 1
    pub version: u64,
    /// When this version was recorded
    pub timestamp: DateTime<Utc>,
    /// Who made the change
    pub author: String,
    /// What kind of change this was
    pub change_type: ChangeType,
    /// Free-form change description
    pub description: String,
    /// Complete snapshot as of this version
    pub data: P,
    /// Field-level diff against the previous live version
    pub changes: DataMap,
}

/// A version of an element
pub type ElementVersion = Version<ElementPayload>;

/// A version of a relationship
pub type RelationshipVersion = Version<RelationshipData>;

impl<P> Version<P> {
    /// Whether this version removed the entity
    pub fn is_delete(&self) -> bool {
        self.change_type == ChangeType::Delete
    }
}

impl ElementVersion {
    pub fn element_type(&self) -> ElementType {
        self.data.element_type
    }
}

/// A requested change, before a version number and timestamp are assigned
#[derive(Debug, Clone)]
pub struct ChangeRequest<P> {
    pub entity_id: String,
    pub change_type: ChangeType,
    /// `None` carries the previous snapshot forward (only meaningful for deletes)
    pub data: Option<P>,
    pub author: String,
    pub description: String,
}

impl<P> ChangeRequest<P> {
    /// Create a new change request
    pub fn new(entity_id: impl Into<String>, change_type: ChangeType, data: P) -> Self {
        Self {
            entity_id: entity_id.into(),
            change_type,
            data: Some(data),
            author: String::new(),
            description: String::new(),
        }
    }

    /// A delete that keeps the last recorded snapshot as its data
    pub fn delete(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            change_type: ChangeType::Delete,
            data: None,
            author: String::new(),
            description: String::new(),
        }
    }

    /// Set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the change description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
