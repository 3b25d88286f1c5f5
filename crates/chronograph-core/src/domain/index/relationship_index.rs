//! Relationship index with a read-through cache

use std::sync::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::versioning::VersionStore;
use crate::error::{Error, Result};

use super::adjacency::{Adjacency, Direction, RelationshipIndexEntry};
use super::cache::{AdjacencyCache, CacheKey, DisabledCache, LruAdjacencyCache};

/// Supplies the current edge set for a full rebuild
#[async_trait]
pub trait RelationshipSource: Send + Sync {
    /// Every live relationship as (id, source, target)
    async fn relationship_entries(&self) -> Result<Vec<RelationshipIndexEntry>>;
}

#[async_trait]
impl RelationshipSource for VersionStore {
    async fn relationship_entries(&self) -> Result<Vec<RelationshipIndexEntry>> {
        Ok(self
            .current_relationships()
            .await
            .into_iter()
            .map(|version| {
                RelationshipIndexEntry::new(version.entity_id, version.data.from, version.data.to)
            })
            .collect())
    }
}

/// Index cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub cache_enabled: bool,
    pub cache_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_capacity: 1024,
        }
    }
}

/// Index observability counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCacheStats {
    pub forward_entries: usize,
    pub reverse_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
}

/// A single write, kept while a rebuild is scanning
#[derive(Debug, Clone)]
enum IndexOp {
    Add(RelationshipIndexEntry),
    Remove(String),
}

/// Writes seen since the oldest in-flight rebuild started
#[derive(Debug, Default)]
struct PendingOps {
    rebuilds: usize,
    ops: Vec<IndexOp>,
}

/// Deregisters a rebuild when it finishes, fails, or is dropped mid-scan
struct RebuildGuard<'a> {
    pending: &'a Mutex<PendingOps>,
}

impl<'a> RebuildGuard<'a> {
    /// Register a rebuild; returns the guard and the log offset it starts at
    fn register(pending: &'a Mutex<PendingOps>) -> (Self, usize) {
        let mut log = pending.lock().unwrap_or_else(|e| e.into_inner());
        log.rebuilds += 1;
        (Self { pending }, log.ops.len())
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        let mut log = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        log.rebuilds = log.rebuilds.saturating_sub(1);
        if log.rebuilds == 0 {
            log.ops.clear();
        }
    }
}

/// Bidirectional relationship lookup
///
/// Adjacency lives behind a `std::sync::RwLock`; no lock is held across an
/// await. Cache population happens under the read lock and invalidation
/// under the write lock, so a lookup never caches a list older than the
/// adjacency it was read from.
///
/// Lock order is adjacency, then the pending log.
#[derive(Debug)]
pub struct RelationshipIndex {
    adjacency: RwLock<Adjacency>,
    cache: Box<dyn AdjacencyCache>,
    hits: AtomicU64,
    misses: AtomicU64,
    pending: Mutex<PendingOps>,
}

impl Default for RelationshipIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl RelationshipIndex {
    /// Create an empty index with the configured cache
    pub fn new(config: IndexConfig) -> Self {
        let cache: Box<dyn AdjacencyCache> = if config.cache_enabled {
            Box::new(LruAdjacencyCache::new(config.cache_capacity))
        } else {
            Box::new(DisabledCache)
        };
        Self::with_cache(cache)
    }

    /// Create an empty index with a custom cache
    pub fn with_cache(cache: Box<dyn AdjacencyCache>) -> Self {
        Self {
            adjacency: RwLock::new(Adjacency::default()),
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            pending: Mutex::new(PendingOps::default()),
        }
    }

    /// Index an edge; re-adding with new endpoints moves it
    pub fn add(&self, relationship_id: &str, source: &str, target: &str) {
        let entry = RelationshipIndexEntry::new(relationship_id, source, target);
        let mut adjacency = self.adjacency.write().unwrap_or_else(|e| e.into_inner());
        let touched = adjacency.insert(&entry);
        self.log(IndexOp::Add(entry));
        self.invalidate(touched);
    }

    /// Remove an edge; unknown IDs are ignored
    pub fn remove(&self, relationship_id: &str) {
        let mut adjacency = self.adjacency.write().unwrap_or_else(|e| e.into_inner());
        let touched = adjacency.remove(relationship_id);
        self.log(IndexOp::Remove(relationship_id.to_string()));
        self.invalidate(touched);
    }

    /// Relationships leaving `element_id`
    pub fn forward(&self, element_id: &str) -> Vec<String> {
        self.cached_lookup(Direction::Forward, element_id)
    }

    /// Relationships arriving at `element_id`
    pub fn reverse(&self, element_id: &str) -> Vec<String> {
        self.cached_lookup(Direction::Reverse, element_id)
    }

    /// Relationships touching `element_id` on either side
    pub fn related(&self, element_id: &str) -> Vec<String> {
        let mut ids = self.forward(element_id);
        ids.extend(self.reverse(element_id));
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn lookup(&self, direction: Direction, element_id: &str) -> Vec<String> {
        match direction {
            Direction::Forward => self.forward(element_id),
            Direction::Reverse => self.reverse(element_id),
            Direction::Both => self.related(element_id),
        }
    }

    /// Replace the whole index with the source's current edges
    ///
    /// The new adjacency is built without holding the lock and swapped in at
    /// the end. Every `add`/`remove` applied while the scan runs is logged
    /// and replayed onto the scanned edges before the swap, so a write that
    /// the scan missed is not lost.
    pub async fn rebuild(
        &self,
        source: &dyn RelationshipSource,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("rebuild_index".to_string()));
        }

        let (_guard, start) = RebuildGuard::register(&self.pending);
        let entries = source.relationship_entries().await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("rebuild_index".to_string()));
        }

        let mut rebuilt = Adjacency::from_entries(entries);
        let edges;
        let replayed;
        {
            let mut adjacency = self.adjacency.write().unwrap_or_else(|e| e.into_inner());
            {
                let log = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                let ops = log.ops.get(start..).unwrap_or_default();
                replayed = ops.len();
                for op in ops {
                    match op {
                        IndexOp::Add(entry) => {
                            rebuilt.insert(entry);
                        }
                        IndexOp::Remove(id) => {
                            rebuilt.remove(id);
                        }
                    }
                }
            }
            edges = rebuilt.edge_count();
            *adjacency = rebuilt;
            self.cache.clear();
            self.hits.store(0, Ordering::Relaxed);
            self.misses.store(0, Ordering::Relaxed);
        }

        info!(edges, replayed, "Rebuilt relationship index");
        Ok(edges)
    }

    pub fn stats(&self) -> IndexCacheStats {
        let adjacency = self.adjacency.read().unwrap_or_else(|e| e.into_inner());
        IndexCacheStats {
            forward_entries: adjacency.forward_len(),
            reverse_entries: adjacency.reverse_len(),
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
            cache_size: self.cache.len(),
        }
    }

    /// Whether forward and reverse maps agree
    pub fn is_consistent(&self) -> bool {
        self.adjacency
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_mirrored()
    }

    fn cached_lookup(&self, direction: Direction, element_id: &str) -> Vec<String> {
        let key: CacheKey = (direction, element_id.to_string());
        let adjacency = self.adjacency.read().unwrap_or_else(|e| e.into_inner());

        if let Some(ids) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return ids;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let ids = adjacency.lookup(direction, element_id);
        self.cache.put(key, ids.clone());
        ids
    }

    /// Record a write for any rebuild that is mid-scan; call under the
    /// adjacency write lock
    fn log(&self, op: IndexOp) {
        let mut log = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if log.rebuilds > 0 {
            log.ops.push(op);
        }
    }

    fn invalidate(&self, touched: Vec<(Direction, String)>) {
        for key in touched {
            debug!(direction = %key.0, element_id = %key.1, "Invalidated adjacency cache");
            self.cache.invalidate(&key);
        }
    }
}
