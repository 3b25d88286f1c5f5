//! Version store
//!
//! Holds one [`VersionHistory`] per element and per relationship. The outer
//! map lock is only taken to find or create a per-entity handle; the
//! per-entity lock is what serializes writes to a single entity.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::clock::{Clock, SystemClock};
use super::history::VersionHistory;
use super::payload::{ElementPayload, Payload, RelationshipData};
use super::version::{ChangeRequest, ElementVersion, RelationshipVersion, Version};

type Handle<P> = Arc<RwLock<VersionHistory<P>>>;

/// Map from entity ID to its independently locked history
#[derive(Debug)]
pub struct Ledger<P> {
    entries: RwLock<HashMap<String, Handle<P>>>,
}

impl<P: Payload> Default for Ledger<P> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: Payload> Ledger<P> {
    fn from_histories(histories: HashMap<String, VersionHistory<P>>) -> Self {
        let entries = histories
            .into_iter()
            .map(|(id, history)| (id, Arc::new(RwLock::new(history))))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    async fn handle(&self, id: &str) -> Option<Handle<P>> {
        self.entries.read().await.get(id).cloned()
    }

    async fn handle_or_insert(&self, id: &str) -> Handle<P> {
        if let Some(handle) = self.handle(id).await {
            return handle;
        }
        let mut entries = self.entries.write().await;
        entries
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(VersionHistory::new(id))))
            .clone()
    }

    /// Snapshot of every handle, sorted by ID
    async fn handles(&self) -> Vec<(String, Handle<P>)> {
        let entries = self.entries.read().await;
        let mut handles: Vec<_> = entries
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Whether `handle` is still the slot registered under `id`
    async fn is_registered(&self, id: &str, handle: &Handle<P>) -> bool {
        self.entries
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Append a version, running `on_commit` before the entity lock is released
    ///
    /// A failed first write removes the slot it created. A writer that was
    /// waiting on a removed slot retries against a fresh one.
    async fn record<F>(&self, request: ChangeRequest<P>, now: DateTime<Utc>, on_commit: F) -> Result<Version<P>>
    where
        F: FnOnce(&Version<P>),
    {
        let id = request.entity_id.clone();
        loop {
            let handle = self.handle_or_insert(&id).await;
            let mut history = handle.write().await;
            if !self.is_registered(&id, &handle).await {
                continue;
            }

            let result = history
                .prepare(request, now)
                .and_then(|version| history.push(version.clone()).map(|()| version));
            return match result {
                Ok(version) => {
                    on_commit(&version);
                    Ok(version)
                }
                Err(e) => {
                    if history.is_empty() {
                        self.entries.write().await.remove(&id);
                    }
                    Err(e)
                }
            };
        }
    }

    async fn range(
        &self,
        id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<Version<P>> {
        match self.handle(id).await {
            Some(handle) => handle.read().await.range(start, end).to_vec(),
            None => Vec::new(),
        }
    }

    async fn as_of(&self, id: &str, at: DateTime<Utc>) -> Option<Version<P>> {
        let handle = self.handle(id).await?;
        let history = handle.read().await;
        history.as_of(at).cloned()
    }

    async fn latest(&self, id: &str) -> Option<Version<P>> {
        let handle = self.handle(id).await?;
        let history = handle.read().await;
        history.latest().cloned()
    }

    async fn version(&self, id: &str, version: u64) -> Option<Version<P>> {
        let handle = self.handle(id).await?;
        let history = handle.read().await;
        history.get(version).cloned()
    }

    /// IDs with at least one recorded version
    ///
    /// A first write holds an empty slot until it commits or is rolled
    /// back; such slots are not tracked.
    async fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for (id, handle) in self.handles().await {
            if !handle.read().await.is_empty() {
                ids.push(id);
            }
        }
        ids
    }

    /// (tracked entities, total versions)
    async fn counts(&self) -> (usize, usize) {
        let mut tracked = 0;
        let mut total = 0;
        for (_, handle) in self.handles().await {
            let len = handle.read().await.len();
            if len > 0 {
                tracked += 1;
                total += len;
            }
        }
        (tracked, total)
    }

    /// State of every entity as of `at`, one entity at a time
    async fn all_as_of(&self, at: DateTime<Utc>) -> Vec<Version<P>> {
        let mut live = Vec::new();
        for (_, handle) in self.handles().await {
            if let Some(version) = handle.read().await.as_of(at) {
                live.push(version.clone());
            }
        }
        live
    }

    /// Latest non-deleted version of every entity
    async fn all_current(&self) -> Vec<Version<P>> {
        let mut live = Vec::new();
        for (_, handle) in self.handles().await {
            if let Some(version) = handle.read().await.current() {
                live.push(version.clone());
            }
        }
        live
    }

    /// Every version of every entity, sorted by (ID, version)
    async fn all_versions(&self) -> Vec<Version<P>> {
        let mut versions = Vec::new();
        for (_, handle) in self.handles().await {
            versions.extend_from_slice(handle.read().await.versions());
        }
        versions
    }
}

/// Counts exposed by [`VersionStore::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub tracked_elements: usize,
    pub tracked_relationships: usize,
    pub total_element_versions: usize,
    pub total_relationship_versions: usize,
}

/// Append-only store of element and relationship versions
#[derive(Debug)]
pub struct VersionStore {
    elements: Ledger<ElementPayload>,
    relationships: Ledger<RelationshipData>,
    clock: Arc<dyn Clock>,
}

impl Default for VersionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionStore {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            elements: Ledger::default(),
            relationships: Ledger::default(),
            clock,
        }
    }

    /// Rebuild a store from previously exported versions
    ///
    /// Versions may arrive in any order; each entity's versions are sorted
    /// by number and replayed through the same checks as a live write.
    pub fn restore(
        clock: Arc<dyn Clock>,
        elements: Vec<ElementVersion>,
        relationships: Vec<RelationshipVersion>,
    ) -> Result<Self> {
        for relationship in &relationships {
            relationship.data.validate().map_err(|e| {
                Error::JournalCorrupted(format!(
                    "relationship '{}' version {}: {}",
                    relationship.entity_id, relationship.version, e
                ))
            })?;
        }

        Ok(Self {
            elements: Ledger::from_histories(replay(elements)?),
            relationships: Ledger::from_histories(replay(relationships)?),
            clock,
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Append a new element version
    pub async fn record_element_change(
        &self,
        request: ChangeRequest<ElementPayload>,
    ) -> Result<ElementVersion> {
        ensure_id(&request.entity_id)?;
        let element_id = request.entity_id.clone();

        match self.elements.record(request, self.now(), |_| {}).await {
            Ok(version) => {
                debug!(
                    element_id = %version.entity_id,
                    version = version.version,
                    change_type = %version.change_type,
                    "Recorded element change"
                );
                Ok(version)
            }
            Err(e) => {
                warn!(element_id = %element_id, error = %e, "Rejected element change");
                Err(e)
            }
        }
    }

    /// Append a new relationship version
    ///
    /// `on_commit` runs after the version is appended and before the
    /// relationship's lock is released, so anything it updates can never
    /// observe a different order of writes than the store.
    pub async fn record_relationship_change<F>(
        &self,
        request: ChangeRequest<RelationshipData>,
        on_commit: F,
    ) -> Result<RelationshipVersion>
    where
        F: FnOnce(&RelationshipVersion),
    {
        ensure_id(&request.entity_id)?;
        if let Some(data) = &request.data {
            data.validate()?;
        }
        let relationship_id = request.entity_id.clone();

        match self.relationships.record(request, self.now(), on_commit).await {
            Ok(version) => {
                debug!(
                    relationship_id = %version.entity_id,
                    version = version.version,
                    change_type = %version.change_type,
                    from = %version.data.from,
                    to = %version.data.to,
                    "Recorded relationship change"
                );
                Ok(version)
            }
            Err(e) => {
                warn!(relationship_id = %relationship_id, error = %e, "Rejected relationship change");
                Err(e)
            }
        }
    }

    /// Element versions within the inclusive bounds, ascending
    pub async fn element_history(
        &self,
        id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ElementVersion>> {
        check_range(start, end)?;
        Ok(self.elements.range(id, start, end).await)
    }

    /// Relationship versions within the inclusive bounds, ascending
    pub async fn relationship_history(
        &self,
        id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<RelationshipVersion>> {
        check_range(start, end)?;
        Ok(self.relationships.range(id, start, end).await)
    }

    /// Element state as of `at`
    pub async fn element_as_of(&self, id: &str, at: DateTime<Utc>) -> Option<ElementVersion> {
        self.elements.as_of(id, at).await
    }

    /// Relationship state as of `at`
    pub async fn relationship_as_of(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Option<RelationshipVersion> {
        self.relationships.as_of(id, at).await
    }

    /// A specific element version
    pub async fn element_version(&self, id: &str, version: u64) -> Option<ElementVersion> {
        self.elements.version(id, version).await
    }

    /// Most recent relationship version, including deletes
    pub async fn latest_relationship(&self, id: &str) -> Option<RelationshipVersion> {
        self.relationships.latest(id).await
    }

    pub async fn element_ids(&self) -> Vec<String> {
        self.elements.ids().await
    }

    pub async fn relationship_ids(&self) -> Vec<String> {
        self.relationships.ids().await
    }

    pub async fn contains_element(&self, id: &str) -> bool {
        match self.elements.handle(id).await {
            Some(handle) => !handle.read().await.is_empty(),
            None => false,
        }
    }

    pub async fn contains_relationship(&self, id: &str) -> bool {
        match self.relationships.handle(id).await {
            Some(handle) => !handle.read().await.is_empty(),
            None => false,
        }
    }

    /// Live elements as of `at`
    pub async fn elements_as_of(&self, at: DateTime<Utc>) -> Vec<ElementVersion> {
        self.elements.all_as_of(at).await
    }

    /// Live relationships as of `at`
    pub async fn relationships_as_of(&self, at: DateTime<Utc>) -> Vec<RelationshipVersion> {
        self.relationships.all_as_of(at).await
    }

    /// Latest non-deleted state of every relationship
    pub async fn current_relationships(&self) -> Vec<RelationshipVersion> {
        self.relationships.all_current().await
    }

    /// Every element version, sorted by (ID, version)
    pub async fn all_element_versions(&self) -> Vec<ElementVersion> {
        self.elements.all_versions().await
    }

    /// Every relationship version, sorted by (ID, version)
    pub async fn all_relationship_versions(&self) -> Vec<RelationshipVersion> {
        self.relationships.all_versions().await
    }

    pub async fn stats(&self) -> StoreStats {
        let (tracked_elements, total_element_versions) = self.elements.counts().await;
        let (tracked_relationships, total_relationship_versions) =
            self.relationships.counts().await;
        StoreStats {
            tracked_elements,
            tracked_relationships,
            total_element_versions,
            total_relationship_versions,
        }
    }
}

fn ensure_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("entity ID must be non-empty".to_string()));
    }
    Ok(())
}

fn check_range(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(Error::InvalidTimeRange),
        _ => Ok(()),
    }
}

fn replay<P: Payload>(versions: Vec<Version<P>>) -> Result<HashMap<String, VersionHistory<P>>> {
    let mut grouped: HashMap<String, Vec<Version<P>>> = HashMap::new();
    for version in versions {
        grouped
            .entry(version.entity_id.clone())
            .or_default()
            .push(version);
    }

    let mut histories = HashMap::with_capacity(grouped.len());
    for (id, mut versions) in grouped {
        versions.sort_by_key(|v| v.version);
        let mut history = VersionHistory::new(id.clone());
        for version in versions {
            let number = version.version;
            history.push(version).map_err(|e| {
                Error::JournalCorrupted(format!("'{}' version {}: {}", id, number, e))
            })?;
        }
        histories.insert(id, history);
    }
    Ok(histories)
}
