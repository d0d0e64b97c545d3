use serde::Serialize;
use std::time::Duration;

/// Errors that abort a diagnosis request or a knowledge/config load.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown match mode: {0} (expected all, partial or wide)")]
    UnknownMatchMode(String),
    #[error("diagnosis temporarily unavailable: {0}")]
    GraphUnavailable(String),
    #[error("invalid knowledge base: {0}")]
    InvalidKnowledge(String),
    #[error("failed to read knowledge file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

pub type DiagnosisResult<T> = std::result::Result<T, DiagnosisError>;

/// Failures reported by a [`KnowledgeGraph`](crate::graph::KnowledgeGraph).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("knowledge graph unreachable: {0}")]
    Unavailable(String),
    #[error("knowledge graph query exceeded {0:?}")]
    Timeout(Duration),
}

impl From<GraphError> for DiagnosisError {
    fn from(e: GraphError) -> Self {
        DiagnosisError::GraphUnavailable(e.to_string())
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// An audit or special-case write (or lookup) that did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct PersistenceError(pub String);

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// Conditions that degrade a diagnosis without failing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosisWarning {
    /// Raw symptom entries that were dropped because they could not be normalized.
    SkippedSymptoms { entries: Vec<String> },
    /// An audit emission or special-case store call failed.
    Persistence { operation: String, message: String },
}

impl DiagnosisWarning {
    pub(crate) fn persistence(operation: &str, error: &PersistenceError) -> Self {
        DiagnosisWarning::Persistence {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for DiagnosisWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosisWarning::SkippedSymptoms { entries } => {
                write!(f, "skipped invalid symptom entries: {}", entries.join(", "))
            }
            DiagnosisWarning::Persistence { operation, message } => {
                write!(f, "{operation} failed: {message}")
            }
        }
    }
}
