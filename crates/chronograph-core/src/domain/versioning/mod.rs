//! Versioning domain module
//!
//! Append-only, per-entity version histories for elements and relationships:
//!
//! - **change**: change and element classification
//! - **payload**: typed snapshots and field-level diffs
//! - **version**: immutable version records and change requests
//! - **history**: ordered history of one entity with point-in-time lookup
//! - **store**: the concurrent store holding every history
//! - **clock**: injectable time source

mod change;
mod clock;
mod history;
mod payload;
mod store;
mod version;

pub use change::{ChangeType, ElementType};
pub use clock::{Clock, ManualClock, SystemClock};
pub use history::VersionHistory;
pub use payload::{DataMap, ElementPayload, Payload, RelationshipData, compute_changes};
pub use store::{Ledger, StoreStats, VersionStore};
pub use version::{ChangeRequest, ElementVersion, RelationshipVersion, Version};
