//! Typed version payloads
//!
//! Element data is free-form, so it stays an open JSON map. Relationship
//! data has a known shape (`from`, `to`, `type`, `confidence`, `critical`)
//! and is parsed into [`RelationshipData`] at the boundary; every other key
//! is carried along as metadata.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::change::ElementType;

/// Open key/value snapshot as exchanged at the boundary
pub type DataMap = Map<String, Value>;

/// Data carried by a version
pub trait Payload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Flatten into the boundary representation
    fn to_map(&self) -> DataMap;
}

/// Snapshot of an element at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementPayload {
    pub element_type: ElementType,
    pub fields: DataMap,
}

impl ElementPayload {
    pub fn new(element_type: ElementType, fields: DataMap) -> Self {
        Self {
            element_type,
            fields,
        }
    }
}

impl Payload for ElementPayload {
    fn to_map(&self) -> DataMap {
        self.fields.clone()
    }
}

/// Snapshot of a relationship edge at one version
///
/// `confidence` is always the value as recorded. Decay is computed when the
/// edge is read and never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipData {
    /// Source element ID
    pub from: String,
    /// Target element ID
    pub to: String,
    /// Relationship label (e.g. "uses", "depends_on")
    #[serde(rename = "type")]
    pub relationship_type: String,
    /// Confidence at the time the version was recorded (0.0 to 1.0)
    pub confidence: f64,
    /// Critical edges are exempt from decay
    #[serde(default)]
    pub critical: bool,
    /// Everything else the caller attached
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: DataMap,
}

impl RelationshipData {
    /// Keys with a fixed meaning in a relationship snapshot
    pub const RESERVED_KEYS: [&'static str; 5] = ["from", "to", "type", "confidence", "critical"];

    /// Create a new relationship payload
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relationship_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relationship_type: relationship_type.into(),
            confidence,
            critical: false,
            metadata: Map::new(),
        }
    }

    /// Mark the edge as critical
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Attach a free-form metadata value
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Parse a boundary snapshot
    ///
    /// Requires `from`, `to` and `type` as non-empty strings and `confidence`
    /// as a number in `[0, 1]`. `critical` is optional and must be a bool.
    pub fn from_snapshot(snapshot: &DataMap) -> Result<Self> {
        let from = required_str(snapshot, "from")?;
        let to = required_str(snapshot, "to")?;
        let relationship_type = required_str(snapshot, "type")?;

        let confidence = snapshot
            .get("confidence")
            .ok_or_else(|| Error::InvalidRelationshipData("missing 'confidence'".to_string()))?
            .as_f64()
            .ok_or_else(|| {
                Error::InvalidRelationshipData("'confidence' must be a number".to_string())
            })?;

        let critical = match snapshot.get("critical") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(Error::InvalidRelationshipData(
                    "'critical' must be a boolean".to_string(),
                ));
            }
        };

        let metadata = snapshot
            .iter()
            .filter(|(key, _)| !Self::RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let data = Self {
            from,
            to,
            relationship_type,
            confidence,
            critical,
            metadata,
        };
        data.validate()?;
        Ok(data)
    }

    /// Check field constraints
    pub fn validate(&self) -> Result<()> {
        if self.from.trim().is_empty() || self.to.trim().is_empty() {
            return Err(Error::InvalidRelationshipData(
                "'from' and 'to' must be non-empty".to_string(),
            ));
        }
        if self.relationship_type.trim().is_empty() {
            return Err(Error::InvalidRelationshipData(
                "'type' must be non-empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidRelationshipData(format!(
                "'confidence' must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

impl Payload for RelationshipData {
    fn to_map(&self) -> DataMap {
        let mut map = self.metadata.clone();
        map.insert("from".to_string(), Value::from(self.from.clone()));
        map.insert("to".to_string(), Value::from(self.to.clone()));
        map.insert(
            "type".to_string(),
            Value::from(self.relationship_type.clone()),
        );
        map.insert("confidence".to_string(), Value::from(self.confidence));
        map.insert("critical".to_string(), Value::from(self.critical));
        map
    }
}

fn required_str(snapshot: &DataMap, key: &str) -> Result<String> {
    match snapshot.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(Error::InvalidRelationshipData(format!(
            "'{}' must be non-empty",
            key
        ))),
        Some(_) => Err(Error::InvalidRelationshipData(format!(
            "'{}' must be a string",
            key
        ))),
        None => Err(Error::InvalidRelationshipData(format!("missing '{}'", key))),
    }
}

/// Field-level difference between two snapshots
///
/// New or changed keys map to their new value; keys that disappeared map to
/// `null`. With no previous snapshot every field counts as changed.
pub fn compute_changes(previous: Option<&DataMap>, current: &DataMap) -> DataMap {
    let Some(previous) = previous else {
        return current.clone();
    };

    let mut changes = Map::new();
    for (key, value) in current {
        if previous.get(key) != Some(value) {
            changes.insert(key.clone(), value.clone());
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> DataMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_relationship_from_snapshot() {
        let data = RelationshipData::from_snapshot(&map(json!({
            "from": "skill-1",
            "to": "persona-1",
            "type": "uses",
            "confidence": 0.95,
            "source": "inference"
        })))
        .unwrap();

        assert_eq!(data.from, "skill-1");
        assert_eq!(data.to, "persona-1");
        assert_eq!(data.relationship_type, "uses");
        assert_eq!(data.confidence, 0.95);
        assert!(!data.critical);
        assert_eq!(data.metadata.get("source"), Some(&json!("inference")));
        assert!(!data.metadata.contains_key("from"));
    }

    #[test]
    fn test_relationship_requires_fields() {
        let missing_type = map(json!({"from": "a", "to": "b", "confidence": 0.5}));
        let err = RelationshipData::from_snapshot(&missing_type).unwrap_err();
        assert!(err.to_string().contains("type"));

        let bad_confidence = map(json!({"from": "a", "to": "b", "type": "uses", "confidence": 1.2}));
        assert!(RelationshipData::from_snapshot(&bad_confidence).is_err());

        let string_confidence =
            map(json!({"from": "a", "to": "b", "type": "uses", "confidence": "high"}));
        assert!(RelationshipData::from_snapshot(&string_confidence).is_err());

        let empty_from = map(json!({"from": "", "to": "b", "type": "uses", "confidence": 0.3}));
        assert!(RelationshipData::from_snapshot(&empty_from).is_err());

        let bad_critical = map(json!({
            "from": "a", "to": "b", "type": "uses", "confidence": 0.3, "critical": "yes"
        }));
        assert!(RelationshipData::from_snapshot(&bad_critical).is_err());
    }

    #[test]
    fn test_relationship_to_map_roundtrip() {
        let data = RelationshipData::new("a", "b", "depends_on", 0.7)
            .with_critical(true)
            .with_metadata("note", "pinned");
        let parsed = RelationshipData::from_snapshot(&data.to_map()).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_compute_changes() {
        let before = map(json!({"level": 1, "name": "python", "tags": ["a"]}));
        let after = map(json!({"level": 2, "name": "python", "owner": "user2"}));

        let changes = compute_changes(Some(&before), &after);
        assert_eq!(changes.get("level"), Some(&json!(2)));
        assert_eq!(changes.get("owner"), Some(&json!("user2")));
        assert_eq!(changes.get("tags"), Some(&Value::Null));
        assert!(!changes.contains_key("name"));

        let initial = compute_changes(None, &after);
        assert_eq!(initial, after);
    }
}
