//! Error types for Chronograph

use thiserror::Error;

/// Result type alias using Chronograph's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Chronograph error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lookup errors (E001-E099)
    #[error("Element '{0}' has no recorded history.")]
    ElementNotFound(String),

    #[error("Relationship '{0}' has no recorded history.")]
    RelationshipNotFound(String),

    #[error("Version {version} of '{id}' does not exist.")]
    VersionNotFound { id: String, version: u64 },

    // Validation errors (E100-E199)
    #[error("Invalid change type '{0}'. Expected one of: create, update, delete.")]
    InvalidChangeType(String),

    #[error("Invalid element type '{0}'.")]
    InvalidElementType(String),

    #[error("'{id}' was deleted. Record a `create` change before updating it again.")]
    TerminalEntity { id: String },

    #[error("Invalid relationship data: {0}")]
    InvalidRelationshipData(String),

    #[error("Invalid time range: start must not be after end.")]
    InvalidTimeRange,

    #[error("Invalid timestamp '{0}'. Use RFC3339, e.g. 2024-06-15T14:30:00Z.")]
    InvalidTimestamp(String),

    #[error("Confidence threshold {0} is outside [0.0, 1.0].")]
    ThresholdOutOfRange(f64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Journal errors (E200-E299)
    #[error("Journal corrupted: {0}")]
    JournalCorrupted(String),

    // Collaborator errors (E300-E399)
    #[error("Relationship source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Operation '{0}' was cancelled")]
    Cancelled(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ElementNotFound(_) => "E001",
            Self::RelationshipNotFound(_) => "E002",
            Self::VersionNotFound { .. } => "E003",
            Self::InvalidChangeType(_) => "E100",
            Self::InvalidElementType(_) => "E101",
            Self::TerminalEntity { .. } => "E102",
            Self::InvalidRelationshipData(_) => "E103",
            Self::InvalidTimeRange => "E104",
            Self::InvalidTimestamp(_) => "E105",
            Self::ThresholdOutOfRange(_) => "E106",
            Self::InvalidInput(_) => "E107",
            Self::JournalCorrupted(_) => "E200",
            Self::SourceUnavailable(_) => "E300",
            Self::Cancelled(_) => "E301",
            Self::ConfigError(_) => "E600",
            Self::Serialization(_) => "E900",
            Self::Io(_) => "E901",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ElementNotFound(_) => Some("chronograph stats".to_string()),
            Self::RelationshipNotFound(_) => Some("chronograph stats".to_string()),
            Self::TerminalEntity { id } => Some(format!(
                "chronograph record-element {} --change create",
                id
            )),
            Self::InvalidElementType(_) => Some(
                "Use one of: persona, skill, template, agent, memory, ensemble, working_memory"
                    .to_string(),
            ),
            Self::ThresholdOutOfRange(_) => {
                Some("Pass a threshold between 0.0 and 1.0".to_string())
            }
            Self::ConfigError(_) => Some("chronograph config show".to_string()),
            _ => None,
        }
    }

    /// Whether the error was raised by input validation before any work was done
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidChangeType(_)
                | Self::InvalidElementType(_)
                | Self::InvalidRelationshipData(_)
                | Self::InvalidTimeRange
                | Self::InvalidTimestamp(_)
                | Self::ThresholdOutOfRange(_)
                | Self::InvalidInput(_)
        )
    }
}
