//! Chronograph Core Library
//!
//! A temporal knowledge graph engine:
//! - Append-only version histories for elements and relationships
//! - Point-in-time ("time travel") graph reconstruction
//! - Confidence decay of relationships, with reinforcement
//! - Bidirectional relationship index with an LRU cache
//! - JSONL journal for persistence
//! - TOML configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;


pub use domain::temporal::{ServiceOptions, TemporalService, parse_timestamp};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::decay::{DecayFunction, DecayModel, DecayOutcome, DecayPolicy};
    pub use crate::domain::graph::{DecayedGraph, GraphSnapshot};
    pub use crate::domain::index::{Direction, IndexCacheStats};
    pub use crate::domain::temporal::{
        DecayStats, ElementHistoryEntry, RelationHistoryEntry, ServiceOptions, TemporalService,
        VersionStats, parse_timestamp,
    };
    pub use crate::domain::versioning::{
        ChangeType, Clock, DataMap, ElementType, ManualClock, SystemClock, VersionStore,
    };
    pub use crate::error::{Error, Result};
}
