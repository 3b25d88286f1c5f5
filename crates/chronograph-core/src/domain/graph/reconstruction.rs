//! Graph reconstruction
//!
//! Replays the version store to the state at a target instant. Entities are
//! visited one at a time, each read under its own lock, so a snapshot taken
//! during concurrent writes is consistent per entity but not across them.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::decay::{DecayModel, DecayOutcome, ReinforcementLedger};
use crate::domain::versioning::{RelationshipVersion, VersionStore};
use crate::error::{Error, Result};

use super::snapshot::{DecayedGraph, ElementView, GraphSnapshot, RelationshipView};

/// Reject thresholds outside `[0, 1]`, NaN included
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(Error::ThresholdOutOfRange(threshold))
    }
}

/// Builds graph snapshots from a version store
#[derive(Debug, Clone, Copy)]
pub struct GraphReconstructor<'a> {
    store: &'a VersionStore,
    decay: &'a dyn DecayModel,
    reinforcement: &'a ReinforcementLedger,
}

impl<'a> GraphReconstructor<'a> {
    pub fn new(
        store: &'a VersionStore,
        decay: &'a dyn DecayModel,
        reinforcement: &'a ReinforcementLedger,
    ) -> Self {
        Self {
            store,
            decay,
            reinforcement,
        }
    }

    /// Effective confidence of one relationship version seen from `viewpoint`
    pub fn effective_confidence(
        &self,
        version: &RelationshipVersion,
        viewpoint: DateTime<Utc>,
    ) -> DecayOutcome {
        let original = version.data.confidence;
        let decayed =
            self.decay
                .decay_at(original, version.timestamp, viewpoint, version.data.critical);
        DecayOutcome {
            original_confidence: original,
            decayed_confidence: self.reinforcement.apply(&version.entity_id, original, decayed),
        }
    }

    /// Graph as of `target`, decayed relative to `target` when asked
    pub async fn graph_at_time(
        &self,
        target: DateTime<Utc>,
        apply_decay: bool,
        cancel: &CancellationToken,
    ) -> Result<GraphSnapshot> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("graph_at_time".to_string()));
        }

        let elements = self.store.elements_as_of(target).await;
        let relationships = self.store.relationships_as_of(target).await;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled("graph_at_time".to_string()));
        }

        let mut snapshot = GraphSnapshot::empty(target, apply_decay);
        for element in &elements {
            snapshot
                .elements
                .insert(element.entity_id.clone(), ElementView::from(element));
        }
        for relationship in &relationships {
            let confidence = if apply_decay {
                self.effective_confidence(relationship, target).decayed_confidence
            } else {
                relationship.data.confidence
            };
            snapshot.relationships.insert(
                relationship.entity_id.clone(),
                RelationshipView::new(relationship, confidence),
            );
        }

        info!(
            at = %target,
            elements = snapshot.element_count(),
            relationships = snapshot.relationship_count(),
            decay_applied = apply_decay,
            "Reconstructed graph"
        );
        Ok(snapshot)
    }

    /// Current graph, decayed to now, without relationships below `threshold`
    pub async fn decayed_graph(
        &self,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<DecayedGraph> {
        validate_threshold(threshold)?;

        let now = self.store.now();
        let mut snapshot = self.graph_at_time(now, true, cancel).await?;
        let total_relationships = snapshot.relationships.len();
        snapshot
            .relationships
            .retain(|_, relationship| relationship.decayed_confidence >= threshold);
        let filtered_out = total_relationships - snapshot.relationships.len();

        info!(
            threshold,
            total_relationships, filtered_out, "Filtered decayed graph"
        );
        Ok(DecayedGraph {
            snapshot,
            threshold,
            total_relationships,
            filtered_out,
        })
    }
}
