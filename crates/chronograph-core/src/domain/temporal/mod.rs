//! Temporal query facade
//!
//! [`TemporalService`] is the single entry point for recording changes and
//! asking questions about the graph's past. There is no global instance;
//! construct one and pass it by reference.

mod entry;
mod service;

pub use entry::{DecayStats, ElementHistoryEntry, RelationHistoryEntry, VersionStats};
pub use service::{ServiceOptions, TemporalService, parse_timestamp};
