//! Temporal service
//!
//! The composition root for the engine: owns one version store, one
//! relationship index, one decay model and one reinforcement ledger, and
//! exposes the operations callers use. Boundary inputs (change types,
//! element types, relationship maps, timestamps) are parsed here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::decay::{
    DecayModel, DecayOutcome, DecayPolicy, ReinforcementConfig, ReinforcementLedger,
};
use crate::domain::graph::{
    DecayedGraph, ElementView, GraphReconstructor, GraphSnapshot, RelationshipView,
};
use crate::domain::index::{Direction, IndexCacheStats, IndexConfig, RelationshipIndex};
use crate::domain::versioning::{
    ChangeRequest, ChangeType, DataMap, ElementPayload, ElementType, ElementVersion,
    RelationshipData, RelationshipVersion, VersionStore,
};
use crate::error::{Error, Result};

use super::entry::{DecayStats, ElementHistoryEntry, RelationHistoryEntry, VersionStats};

/// Parse an RFC3339 boundary timestamp
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(input.to_string()))
}

/// Engine settings not owned by the store
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub decay: Arc<dyn DecayModel>,
    pub reinforcement: ReinforcementConfig,
    pub index: IndexConfig,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            decay: Arc::new(DecayPolicy::default()),
            reinforcement: ReinforcementConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

/// Temporal knowledge graph service
#[derive(Debug)]
pub struct TemporalService {
    store: Arc<VersionStore>,
    index: RelationshipIndex,
    decay: Arc<dyn DecayModel>,
    reinforcement: ReinforcementLedger,
}

impl Default for TemporalService {
    fn default() -> Self {
        Self::new(ServiceOptions::default())
    }
}

impl TemporalService {
    /// Create a service over an empty store on the system clock
    pub fn new(options: ServiceOptions) -> Self {
        Self::assemble(Arc::new(VersionStore::new()), options)
    }

    /// Create a service over an existing store, indexing its current edges
    pub async fn open(store: Arc<VersionStore>, options: ServiceOptions) -> Result<Self> {
        let service = Self::assemble(store, options);
        service.rebuild_index(&CancellationToken::new()).await?;
        Ok(service)
    }

    fn assemble(store: Arc<VersionStore>, options: ServiceOptions) -> Self {
        Self {
            store,
            index: RelationshipIndex::new(options.index),
            decay: options.decay,
            reinforcement: ReinforcementLedger::new(options.reinforcement),
        }
    }

    /// The underlying store, for journal export
    pub fn version_store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn decay_model(&self) -> &dyn DecayModel {
        self.decay.as_ref()
    }

    fn reconstructor(&self) -> GraphReconstructor<'_> {
        GraphReconstructor::new(&self.store, self.decay.as_ref(), &self.reinforcement)
    }

    // ========== Recording ==========

    /// Record an element change from boundary values
    pub async fn record_element_change(
        &self,
        element_id: &str,
        element_type: &str,
        data: DataMap,
        author: &str,
        change_type: &str,
        description: &str,
    ) -> Result<ElementVersion> {
        let change_type: ChangeType = change_type.parse()?;
        let element_type: ElementType = element_type.parse()?;

        let request = if change_type == ChangeType::Delete && data.is_empty() {
            ChangeRequest::delete(element_id)
        } else {
            ChangeRequest::new(element_id, change_type, ElementPayload::new(element_type, data))
        };
        self.commit_element(request.with_author(author).with_description(description))
            .await
    }

    /// Record a typed element change
    pub async fn commit_element(
        &self,
        request: ChangeRequest<ElementPayload>,
    ) -> Result<ElementVersion> {
        self.store.record_element_change(request).await
    }

    /// Record a relationship change from boundary values
    ///
    /// `data` must carry `from`, `to`, `type` and `confidence`. A delete with
    /// empty data keeps the previous snapshot.
    pub async fn record_relationship_change(
        &self,
        relationship_id: &str,
        data: DataMap,
        author: &str,
        change_type: &str,
        description: &str,
    ) -> Result<RelationshipVersion> {
        let change_type: ChangeType = change_type.parse()?;

        let request = if change_type == ChangeType::Delete && data.is_empty() {
            ChangeRequest::delete(relationship_id)
        } else {
            let parsed = RelationshipData::from_snapshot(&data)?;
            ChangeRequest::new(relationship_id, change_type, parsed)
        };
        self.commit_relationship(request.with_author(author).with_description(description))
            .await
    }

    /// Record a typed relationship change and keep the index in step
    pub async fn commit_relationship(
        &self,
        request: ChangeRequest<RelationshipData>,
    ) -> Result<RelationshipVersion> {
        self.store
            .record_relationship_change(request, |version| {
                if version.is_delete() {
                    self.index.remove(&version.entity_id);
                    self.reinforcement.clear(&version.entity_id);
                } else {
                    self.index
                        .add(&version.entity_id, &version.data.from, &version.data.to);
                }
            })
            .await
    }

    // ========== History ==========

    /// Element versions within the inclusive bounds
    pub async fn get_element_history(
        &self,
        element_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ElementHistoryEntry>> {
        let versions = self.store.element_history(element_id, start, end).await?;
        if versions.is_empty() && !self.store.contains_element(element_id).await {
            return Err(Error::ElementNotFound(element_id.to_string()));
        }
        Ok(versions.into_iter().map(ElementHistoryEntry::from).collect())
    }

    /// Relationship versions within the inclusive bounds
    ///
    /// With `apply_decay`, each entry is decayed as seen from `end`, or from
    /// now when the range is open-ended.
    pub async fn get_relationship_history(
        &self,
        relationship_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        apply_decay: bool,
    ) -> Result<Vec<RelationHistoryEntry>> {
        let versions = self
            .store
            .relationship_history(relationship_id, start, end)
            .await?;
        if versions.is_empty() && !self.store.contains_relationship(relationship_id).await {
            return Err(Error::RelationshipNotFound(relationship_id.to_string()));
        }

        let viewpoint = end.unwrap_or_else(|| self.store.now());
        let engine = self.reconstructor();
        Ok(versions
            .into_iter()
            .map(|version| {
                let decayed = apply_decay
                    .then(|| engine.effective_confidence(&version, viewpoint).decayed_confidence);
                RelationHistoryEntry::new(version, decayed)
            })
            .collect())
    }

    /// Element state at `at`; `None` if it did not exist then
    pub async fn get_element_at_time(
        &self,
        element_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ElementView>> {
        if !self.store.contains_element(element_id).await {
            return Err(Error::ElementNotFound(element_id.to_string()));
        }
        Ok(self
            .store
            .element_as_of(element_id, at)
            .await
            .map(|version| ElementView::from(&version)))
    }

    /// Relationship state at `at`, decayed relative to `at` when asked
    pub async fn get_relationship_at_time(
        &self,
        relationship_id: &str,
        at: DateTime<Utc>,
        apply_decay: bool,
    ) -> Result<Option<RelationshipView>> {
        if !self.store.contains_relationship(relationship_id).await {
            return Err(Error::RelationshipNotFound(relationship_id.to_string()));
        }
        let Some(version) = self.store.relationship_as_of(relationship_id, at).await else {
            return Ok(None);
        };
        let confidence = if apply_decay {
            self.reconstructor()
                .effective_confidence(&version, at)
                .decayed_confidence
        } else {
            version.data.confidence
        };
        Ok(Some(RelationshipView::new(&version, confidence)))
    }

    /// Pretty-printed JSON of an element's data at one version
    pub async fn export_element_version(&self, element_id: &str, version: u64) -> Result<String> {
        if !self.store.contains_element(element_id).await {
            return Err(Error::ElementNotFound(element_id.to_string()));
        }
        let found = self
            .store
            .element_version(element_id, version)
            .await
            .ok_or_else(|| Error::VersionNotFound {
                id: element_id.to_string(),
                version,
            })?;
        Ok(serde_json::to_string_pretty(&found.data.fields)?)
    }

    // ========== Graph views ==========

    /// Graph as of `at`
    pub async fn get_graph_at_time(
        &self,
        at: DateTime<Utc>,
        apply_decay: bool,
    ) -> Result<GraphSnapshot> {
        self.graph_at_time(at, apply_decay, &CancellationToken::new())
            .await
    }

    /// Graph as of `at`, abandoning the scan if `cancel` fires
    pub async fn graph_at_time(
        &self,
        at: DateTime<Utc>,
        apply_decay: bool,
        cancel: &CancellationToken,
    ) -> Result<GraphSnapshot> {
        self.reconstructor()
            .graph_at_time(at, apply_decay, cancel)
            .await
    }

    /// Current graph without relationships whose decayed confidence is below `threshold`
    pub async fn get_decayed_graph(&self, threshold: f64) -> Result<DecayedGraph> {
        self.decayed_graph(threshold, &CancellationToken::new())
            .await
    }

    pub async fn decayed_graph(
        &self,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<DecayedGraph> {
        self.reconstructor().decayed_graph(threshold, cancel).await
    }

    // ========== Reinforcement ==========

    /// Record an affirmation of a live relationship; returns the new count
    pub async fn reinforce_relationship(&self, relationship_id: &str) -> Result<u32> {
        self.live_relationship(relationship_id).await?;
        let count = self.reinforcement.reinforce(relationship_id);
        debug!(relationship_id = %relationship_id, count, "Reinforcement recorded");
        Ok(count)
    }

    pub fn reinforcement_count(&self, relationship_id: &str) -> u32 {
        self.reinforcement.count(relationship_id)
    }

    // ========== Projection ==========

    /// Confidence a live relationship is expected to hold at `at`
    ///
    /// `at` must not be before now. Reinforcement recorded so far is applied.
    pub async fn project_relationship_confidence(
        &self,
        relationship_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DecayOutcome> {
        let version = self.live_relationship(relationship_id).await?;
        let original = version.data.confidence;
        let decayed = self.decay.project(
            original,
            version.timestamp,
            self.store.now(),
            at,
            version.data.critical,
        )?;
        Ok(DecayOutcome {
            original_confidence: original,
            decayed_confidence: self.reinforcement.apply(relationship_id, original, decayed),
        })
    }

    /// Time until a live relationship reaches its next half-life mark
    ///
    /// `None` when the relationship is exempt from decay.
    pub async fn half_life_remaining(&self, relationship_id: &str) -> Result<Option<Duration>> {
        let version = self.live_relationship(relationship_id).await?;
        let elapsed = self.store.now() - version.timestamp;
        Ok(self
            .decay
            .half_life_remaining(version.data.confidence, elapsed, version.data.critical))
    }

    async fn live_relationship(&self, relationship_id: &str) -> Result<RelationshipVersion> {
        match self.store.latest_relationship(relationship_id).await {
            Some(latest) if !latest.is_delete() => Ok(latest),
            _ => Err(Error::RelationshipNotFound(relationship_id.to_string())),
        }
    }

    // ========== Index ==========

    /// Relationship IDs touching `element_id` in the given direction
    pub fn related_relationships(&self, element_id: &str, direction: Direction) -> Vec<String> {
        self.index.lookup(direction, element_id)
    }

    pub fn index_stats(&self) -> IndexCacheStats {
        self.index.stats()
    }

    /// Rebuild the index from the store
    pub async fn rebuild_index(&self, cancel: &CancellationToken) -> Result<usize> {
        self.index.rebuild(self.store.as_ref(), cancel).await
    }

    pub fn index_is_consistent(&self) -> bool {
        self.index.is_consistent()
    }

    // ========== Stats ==========

    pub async fn get_version_stats(&self) -> VersionStats {
        let store = self.store.stats().await;
        let stats = VersionStats {
            tracked_elements: store.tracked_elements,
            tracked_relationships: store.tracked_relationships,
            total_element_versions: store.total_element_versions,
            total_relationship_versions: store.total_relationship_versions,
            total_versions: store.total_element_versions + store.total_relationship_versions,
            decay_stats: self.get_decay_stats().await,
        };
        info!(
            tracked_elements = stats.tracked_elements,
            tracked_relationships = stats.tracked_relationships,
            total_versions = stats.total_versions,
            reinforced_relationships = stats.decay_stats.reinforced_relationships,
            "Computed version stats"
        );
        stats
    }

    /// Effective confidence spread of the live relationships as of now
    pub async fn get_decay_stats(&self) -> DecayStats {
        let now = self.store.now();
        let reinforcement = self.reinforcement.stats();
        let mut stats = DecayStats {
            reinforced_relationships: reinforcement.reinforced_relationships,
            average_reinforcements: reinforcement.average_reinforcements,
            total_reinforcement_bonus: reinforcement.total_reinforcement_bonus,
            reference_time: now,
            decay_configuration: self.decay_configuration(),
            ..DecayStats::default()
        };

        let engine = self.reconstructor();
        for version in self.store.current_relationships().await {
            stats.tally(engine.effective_confidence(&version, now).decayed_confidence);
        }
        stats
    }

    fn decay_configuration(&self) -> DataMap {
        let reinforcement = self.reinforcement.config();
        let mut config = self.decay.describe();
        config.insert("reinforcement_enabled".to_string(), json!(reinforcement.enabled));
        config.insert("reinforcement_bonus".to_string(), json!(reinforcement.bonus));
        config.insert("reinforcement_fade".to_string(), json!(reinforcement.fade));
        config
    }
}
