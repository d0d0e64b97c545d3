//! # MediDx Core
//!
//! Core inference logic for the MediDx diagnosis assistant.
//!
//! This crate contains the pure diagnosis pipeline:
//! - Symptom normalization and the symptom → disease probability table
//! - Knowledge graph connection counts and the ALL / PARTIAL / WIDE match filter
//! - Special-case detection, the special-case store and audit events
//! - Loading the knowledge file from YAML
//!
//! **No shell concerns**: argument parsing, prompts and rendering belong in `medidx-cli`.
//! Storage backends plug in through the [`KnowledgeGraph`], [`SpecialCaseStore`] and
//! [`AuditEmitter`] traits.

pub mod audit;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod matching;
pub mod probability;
pub mod special_case;
pub mod store;
pub mod validation;

pub use medidx_types;

pub use audit::{AuditEmitter, AuditEvent, MemoryAuditEmitter, TracingAuditEmitter};
pub use config::DiagnosisConfig;
pub use engine::{DiagnosisReport, DiagnosisRequest, DiagnosisService};
pub use error::{
    DiagnosisError, DiagnosisResult, DiagnosisWarning, GraphError, GraphResult,
    PersistenceError, PersistenceResult,
};
pub use graph::{GraphAnswer, InMemoryKnowledgeGraph, KnowledgeGraph, QueryOptions};
pub use knowledge::KnowledgeBase;
pub use matching::{CandidateDisease, ConfidenceLevel, MatchMode};
pub use probability::{Aggregation, ProbabilityTable, ScoredDisease, SymptomBreakdown};
pub use special_case::{SpecialCase, SpecialCaseTrigger};
pub use store::{
    InMemorySpecialCaseStore, JsonFileSpecialCaseStore, SimilarCase, SpecialCaseRecord,
    SpecialCaseStore,
};
