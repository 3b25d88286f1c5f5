//! Storage layer - JSONL journal
//!
//! The engine itself is in-memory. The journal persists a version store as
//! JSON Lines and restores it, re-checking every ordering invariant.
//!
//! # Usage
//!
//! ```ignore
//! use chronograph_core::storage::{export_to_path, import_from_path};
//!
//! let store = import_from_path(&path, clock)?;
//! // ... record changes ...
//! export_to_path(&store, &path).await?;
//! ```

pub mod jsonl;

pub use jsonl::{
    ExportResult, JournalRecord, export_store, export_to_path, import_from_path,
    import_from_reader,
};
