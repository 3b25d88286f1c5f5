//! JSONL journal of the version store
//!
//! One version per line, tagged with its kind:
//!
//! ```text
//! {"kind":"element","entity_id":"skill-python","version":1,...}
//! {"kind":"relationship","entity_id":"rel-1","version":1,...}
//! ```
//!
//! Output is sorted by (kind, entity ID, version) so that re-exporting an
//! unchanged store yields an identical file. Import replays every record
//! through the store's ordering and terminal-state checks.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::versioning::{Clock, ElementVersion, RelationshipVersion, VersionStore};
use crate::error::{Error, Result};

/// One line of the journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    Element(ElementVersion),
    Relationship(RelationshipVersion),
}

/// Result of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportResult {
    pub element_versions: usize,
    pub relationship_versions: usize,
}

impl ExportResult {
    pub fn total_records(&self) -> usize {
        self.element_versions + self.relationship_versions
    }
}

// =============================================================================
// Export
// =============================================================================

/// Write every version in the store to `writer`
pub async fn export_store<W: Write>(store: &VersionStore, writer: &mut W) -> Result<ExportResult> {
    let elements = store.all_element_versions().await;
    let relationships = store.all_relationship_versions().await;
    let result = ExportResult {
        element_versions: elements.len(),
        relationship_versions: relationships.len(),
    };

    for version in elements {
        write_record(writer, &JournalRecord::Element(version))?;
    }
    for version in relationships {
        write_record(writer, &JournalRecord::Relationship(version))?;
    }
    writer.flush()?;
    Ok(result)
}

/// Write the journal to `path`, replacing any previous file
///
/// The journal is written next to the destination and renamed into place,
/// so a failed export never leaves a truncated journal behind. The staging
/// file is removed when the write or the rename fails.
pub async fn export_to_path(store: &VersionStore, path: &Path) -> Result<ExportResult> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let staging = staging_path(path);
    let written = match write_staging(store, &staging).await {
        Ok(result) => fs::rename(&staging, path).map(|()| result).map_err(Error::from),
        Err(e) => Err(e),
    };
    let result = match written {
        Ok(result) => result,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!(path = %staging.display(), error = %cleanup, "Could not remove staging journal");
            }
            return Err(e);
        }
    };

    info!(
        path = %path.display(),
        records = result.total_records(),
        "Exported journal"
    );
    Ok(result)
}

async fn write_staging(store: &VersionStore, staging: &Path) -> Result<ExportResult> {
    let file = File::create(staging)?;
    let mut writer = BufWriter::new(file);
    export_store(store, &mut writer).await
}

fn write_record<W: Write>(writer: &mut W, record: &JournalRecord) -> Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// =============================================================================
// Import
// =============================================================================

/// Rebuild a store from journal lines
pub fn import_from_reader<R: BufRead>(reader: R, clock: Arc<dyn Clock>) -> Result<VersionStore> {
    let mut elements = Vec::new();
    let mut relationships = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecord = serde_json::from_str(&line)
            .map_err(|e| Error::JournalCorrupted(format!("line {}: {}", number + 1, e)))?;
        match record {
            JournalRecord::Element(version) => elements.push(version),
            JournalRecord::Relationship(version) => relationships.push(version),
        }
    }

    VersionStore::restore(clock, elements, relationships)
}

/// Load a journal file; a missing file yields an empty store
pub fn import_from_path(path: &Path, clock: Arc<dyn Clock>) -> Result<VersionStore> {
    if !path.exists() {
        info!(path = %path.display(), "No journal found, starting empty");
        return Ok(VersionStore::with_clock(clock));
    }

    let file = File::open(path)?;
    let store = import_from_reader(BufReader::new(file), clock)?;
    info!(path = %path.display(), "Imported journal");
    Ok(store)
}
