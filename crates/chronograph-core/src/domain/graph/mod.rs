//! Graph reconstruction domain module

mod reconstruction;
mod snapshot;

pub use reconstruction::{GraphReconstructor, validate_threshold};
pub use snapshot::{DecayedGraph, ElementView, GraphSnapshot, RelationshipView};
