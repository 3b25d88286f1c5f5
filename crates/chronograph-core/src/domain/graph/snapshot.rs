//! Reconstructed graph views

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decay::DecayOutcome;
use crate::domain::versioning::{DataMap, ElementType, ElementVersion, RelationshipVersion};

/// An element as it stood at the snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementView {
    pub element_id: String,
    pub element_type: ElementType,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub data: DataMap,
}

impl From<&ElementVersion> for ElementView {
    fn from(version: &ElementVersion) -> Self {
        Self {
            element_id: version.entity_id.clone(),
            element_type: version.data.element_type,
            version: version.version,
            timestamp: version.timestamp,
            data: version.data.fields.clone(),
        }
    }
}

/// A relationship as it stood at the snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipView {
    pub relationship_id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub critical: bool,
    /// Confidence as recorded
    pub original_confidence: f64,
    /// Effective confidence; equals the original when decay is off
    pub decayed_confidence: f64,
    /// Share of the original lost to decay, 0 to 100
    pub decay_percentage: f64,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: DataMap,
}

impl RelationshipView {
    pub fn new(version: &RelationshipVersion, decayed_confidence: f64) -> Self {
        Self {
            relationship_id: version.entity_id.clone(),
            from: version.data.from.clone(),
            to: version.data.to.clone(),
            relationship_type: version.data.relationship_type.clone(),
            version: version.version,
            timestamp: version.timestamp,
            critical: version.data.critical,
            original_confidence: version.data.confidence,
            decayed_confidence,
            decay_percentage: DecayOutcome {
                original_confidence: version.data.confidence,
                decayed_confidence,
            }
            .decay_percentage(),
            metadata: version.data.metadata.clone(),
        }
    }
}

/// State of the whole graph at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub timestamp: DateTime<Utc>,
    pub elements: BTreeMap<String, ElementView>,
    pub relationships: BTreeMap<String, RelationshipView>,
    pub decay_applied: bool,
}

impl GraphSnapshot {
    pub fn empty(timestamp: DateTime<Utc>, decay_applied: bool) -> Self {
        Self {
            timestamp,
            elements: BTreeMap::new(),
            relationships: BTreeMap::new(),
            decay_applied,
        }
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Relationships whose source is `element_id`
    pub fn outgoing<'a>(&'a self, element_id: &'a str) -> impl Iterator<Item = &'a RelationshipView> + 'a {
        self.relationships
            .values()
            .filter(move |relationship| relationship.from == element_id)
    }
}

/// The current graph with weak relationships filtered out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayedGraph {
    pub snapshot: GraphSnapshot,
    pub threshold: f64,
    /// Relationships before filtering
    pub total_relationships: usize,
    /// Relationships dropped for falling below the threshold
    pub filtered_out: usize,
}
