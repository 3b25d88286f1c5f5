//! Change and element classification
//!
//! Every recorded version carries a [`ChangeType`]. The terminal-state rule
//! (nothing but `create` may follow a `delete`) lives in [`ChangeType::can_follow`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The kind of mutation a version represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The entity came into existence (or was re-created after a delete)
    Create,
    /// Fields of a live entity changed
    Update,
    /// The entity was removed; terminal until the next `Create`
    Delete,
}

impl ChangeType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Whether this change may be appended after `previous`
    ///
    /// `None` means the entity has no versions yet.
    pub fn can_follow(self, previous: Option<ChangeType>) -> bool {
        match previous {
            Some(ChangeType::Delete) => self == ChangeType::Create,
            _ => true,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::InvalidChangeType(s.to_string()))
    }
}

/// Types of versionable elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Persona,
    Skill,
    Template,
    Agent,
    Memory,
    Ensemble,
    WorkingMemory,
}

impl ElementType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persona => "persona",
            Self::Skill => "skill",
            Self::Template => "template",
            Self::Agent => "agent",
            Self::Memory => "memory",
            Self::Ensemble => "ensemble",
            Self::WorkingMemory => "working_memory",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "persona" => Some(Self::Persona),
            "skill" => Some(Self::Skill),
            "template" => Some(Self::Template),
            "agent" => Some(Self::Agent),
            "memory" => Some(Self::Memory),
            "ensemble" => Some(Self::Ensemble),
            "working_memory" | "workingmemory" => Some(Self::WorkingMemory),
            _ => None,
        }
    }

    /// Get all element types
    pub fn all() -> &'static [ElementType] {
        &[
            Self::Persona,
            Self::Skill,
            Self::Template,
            Self::Agent,
            Self::Memory,
            Self::Ensemble,
            Self::WorkingMemory,
        ]
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::InvalidElementType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_parse() {
        assert_eq!(ChangeType::parse("create"), Some(ChangeType::Create));
        assert_eq!(ChangeType::parse(" Update "), Some(ChangeType::Update));
        assert_eq!(ChangeType::parse("DELETE"), Some(ChangeType::Delete));
        assert_eq!(ChangeType::parse("activate"), None);
    }

    #[test]
    fn test_change_type_from_str_error() {
        let err = "major".parse::<ChangeType>().unwrap_err();
        assert_eq!(err.code(), "E100");
    }

    #[test]
    fn test_delete_is_terminal() {
        assert!(ChangeType::Create.can_follow(None));
        assert!(ChangeType::Update.can_follow(Some(ChangeType::Create)));
        assert!(ChangeType::Delete.can_follow(Some(ChangeType::Update)));
        assert!(!ChangeType::Update.can_follow(Some(ChangeType::Delete)));
        assert!(!ChangeType::Delete.can_follow(Some(ChangeType::Delete)));
        assert!(ChangeType::Create.can_follow(Some(ChangeType::Delete)));
    }

    #[test]
    fn test_element_type_roundtrip() {
        for element_type in ElementType::all() {
            assert_eq!(ElementType::parse(element_type.as_str()), Some(*element_type));
        }
        assert!("widget".parse::<ElementType>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&ElementType::WorkingMemory).unwrap();
        assert_eq!(json, "\"working_memory\"");
        let change: ChangeType = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(change, ChangeType::Delete);
    }
}
