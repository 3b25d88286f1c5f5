//! Relationship index
//!
//! Answers "which relationships leave / arrive at this element" without
//! scanning the version store. Adjacency and caching are separate concerns:
//! [`Adjacency`] holds the mirrored maps and [`AdjacencyCache`] fronts
//! lookups.

mod adjacency;
mod cache;
mod relationship_index;

pub use adjacency::{Adjacency, Direction, RelationshipIndexEntry};
pub use cache::{AdjacencyCache, CacheKey, DisabledCache, LruAdjacencyCache};
pub use relationship_index::{IndexCacheStats, IndexConfig, RelationshipIndex, RelationshipSource};
