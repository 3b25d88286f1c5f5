//! Per-entity version history
//!
//! Versions are kept in a `Vec` ordered by version number. Because
//! timestamps never decrease within one history, the same vector is also
//! ordered by time, so point-in-time lookups are a binary search.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

use super::payload::{Payload, compute_changes};
use super::version::{ChangeRequest, Version};

/// Append-only history of a single element or relationship
#[derive(Debug, Clone)]
pub struct VersionHistory<P> {
    entity_id: String,
    versions: Vec<Version<P>>,
}

impl<P: Payload> VersionHistory<P> {
    /// Create an empty history
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            versions: Vec::new(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Number of recorded versions
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Highest version number, 0 when empty
    pub fn current_version(&self) -> u64 {
        self.versions.last().map(|v| v.version).unwrap_or(0)
    }

    /// Most recent version regardless of change type
    pub fn latest(&self) -> Option<&Version<P>> {
        self.versions.last()
    }

    /// Most recent version if the entity is currently live
    pub fn current(&self) -> Option<&Version<P>> {
        self.latest().filter(|v| !v.is_delete())
    }

    /// All versions, ascending
    pub fn versions(&self) -> &[Version<P>] {
        &self.versions
    }

    /// Look up a specific version number
    pub fn get(&self, version: u64) -> Option<&Version<P>> {
        // Versions are contiguous from 1, so the number doubles as an index
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        self.versions.get(index).filter(|v| v.version == version)
    }

    /// Build the next version for `request` without appending it
    ///
    /// The timestamp is `now`, pulled forward to the previous version's
    /// timestamp if the clock went backwards.
    pub fn prepare(&self, request: ChangeRequest<P>, now: DateTime<Utc>) -> Result<Version<P>> {
        let latest = self.latest();
        if !request
            .change_type
            .can_follow(latest.map(|v| v.change_type))
        {
            return Err(Error::TerminalEntity {
                id: self.entity_id.clone(),
            });
        }

        let data = match (request.data, latest) {
            (Some(data), _) => data,
            (None, Some(previous)) => previous.data.clone(),
            (None, None) => {
                return Err(Error::InvalidInput(format!(
                    "'{}' has no previous snapshot to carry forward",
                    self.entity_id
                )));
            }
        };

        let timestamp = match latest {
            Some(previous) if previous.timestamp > now => previous.timestamp,
            _ => now,
        };

        // A re-create starts from a clean slate rather than diffing against
        // the deleted snapshot
        let previous_live = self.current().map(|v| v.data.to_map());
        let changes = compute_changes(previous_live.as_ref(), &data.to_map());

        Ok(Version {
            entity_id: self.entity_id.clone(),
            version: self.current_version() + 1,
            timestamp,
            author: request.author,
            change_type: request.change_type,
            description: request.description,
            data,
            changes,
        })
    }

    /// Append a fully formed version, enforcing every ordering invariant
    pub fn push(&mut self, version: Version<P>) -> Result<()> {
        if version.entity_id != self.entity_id {
            return Err(Error::InvalidInput(format!(
                "version for '{}' appended to history of '{}'",
                version.entity_id, self.entity_id
            )));
        }
        let expected = self.current_version() + 1;
        if version.version != expected {
            return Err(Error::InvalidInput(format!(
                "'{}' expected version {}, got {}",
                self.entity_id, expected, version.version
            )));
        }
        if let Some(previous) = self.latest() {
            if version.timestamp < previous.timestamp {
                return Err(Error::InvalidInput(format!(
                    "'{}' version {} is older than version {}",
                    self.entity_id, version.version, previous.version
                )));
            }
        }
        if !version
            .change_type
            .can_follow(self.latest().map(|v| v.change_type))
        {
            return Err(Error::TerminalEntity {
                id: self.entity_id.clone(),
            });
        }

        self.versions.push(version);
        Ok(())
    }

    /// Version with the greatest timestamp at or before `at`, deletes included
    pub fn at_or_before(&self, at: DateTime<Utc>) -> Option<&Version<P>> {
        let idx = self.versions.partition_point(|v| v.timestamp <= at);
        idx.checked_sub(1).map(|i| &self.versions[i])
    }

    /// State of the entity as of `at`; `None` if it did not exist or was deleted
    pub fn as_of(&self, at: DateTime<Utc>) -> Option<&Version<P>> {
        self.at_or_before(at).filter(|v| !v.is_delete())
    }

    /// Versions whose timestamp falls within the inclusive bounds
    pub fn range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> &[Version<P>] {
        let lo = match start {
            Some(start) => self.versions.partition_point(|v| v.timestamp < start),
            None => 0,
        };
        let hi = match end {
            Some(end) => self.versions.partition_point(|v| v.timestamp <= end),
            None => self.versions.len(),
        };
        if lo >= hi { &[] } else { &self.versions[lo..hi] }
    }
}
