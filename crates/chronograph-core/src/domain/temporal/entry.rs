//! Boundary result types for history and stats queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decay::DecayOutcome;
use crate::domain::versioning::{
    ChangeType, DataMap, ElementType, ElementVersion, Payload, RelationshipVersion,
};

/// One historical record of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementHistoryEntry {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub change_type: ChangeType,
    pub description: String,
    pub element_type: ElementType,
    pub element_data: DataMap,
    pub changes: DataMap,
}

impl From<ElementVersion> for ElementHistoryEntry {
    fn from(version: ElementVersion) -> Self {
        Self {
            version: version.version,
            timestamp: version.timestamp,
            author: version.author,
            change_type: version.change_type,
            description: version.description,
            element_type: version.data.element_type,
            element_data: version.data.fields,
            changes: version.changes,
        }
    }
}

/// One historical record of a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationHistoryEntry {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub change_type: ChangeType,
    pub description: String,
    pub relationship_data: DataMap,
    pub changes: DataMap,
    pub original_confidence: f64,
    /// Present only when decay was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decayed_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_percentage: Option<f64>,
}

impl RelationHistoryEntry {
    pub fn new(version: RelationshipVersion, decayed_confidence: Option<f64>) -> Self {
        let decay_percentage = decayed_confidence.map(|decayed| {
            DecayOutcome {
                original_confidence: version.data.confidence,
                decayed_confidence: decayed,
            }
            .decay_percentage()
        });
        Self {
            version: version.version,
            timestamp: version.timestamp,
            author: version.author,
            change_type: version.change_type,
            description: version.description,
            relationship_data: version.data.to_map(),
            changes: version.changes,
            original_confidence: version.data.confidence,
            decayed_confidence,
            decay_percentage,
        }
    }
}

/// Confidence spread of the live relationships and the decay settings behind it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayStats {
    pub total_relationships: usize,
    pub reinforced_relationships: usize,
    pub average_reinforcements: f64,
    pub total_reinforcement_bonus: f64,
    /// Effective confidence >= 0.8
    pub high_confidence_count: usize,
    /// Effective confidence in [0.5, 0.8)
    pub medium_confidence_count: usize,
    /// Effective confidence < 0.5
    pub low_confidence_count: usize,
    pub reference_time: DateTime<Utc>,
    pub decay_configuration: DataMap,
}

impl DecayStats {
    pub const HIGH_CONFIDENCE: f64 = 0.8;
    pub const MEDIUM_CONFIDENCE: f64 = 0.5;

    /// Count one effective confidence into its bucket
    pub fn tally(&mut self, confidence: f64) {
        self.total_relationships += 1;
        if confidence >= Self::HIGH_CONFIDENCE {
            self.high_confidence_count += 1;
        } else if confidence >= Self::MEDIUM_CONFIDENCE {
            self.medium_confidence_count += 1;
        } else {
            self.low_confidence_count += 1;
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionStats {
    pub tracked_elements: usize,
    pub tracked_relationships: usize,
    pub total_element_versions: usize,
    pub total_relationship_versions: usize,
    pub total_versions: usize,
    pub decay_stats: DecayStats,
}
