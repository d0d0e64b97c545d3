//! Constants used throughout the medidx core crate.
//!
//! This module contains default thresholds and audit event kinds to ensure
//! consistency across the codebase and make maintenance easier.

/// Default knowledge file looked up relative to the working directory.
pub const DEFAULT_KNOWLEDGE_FILE: &str = "knowledge.yaml";

/// Default special-case store file looked up relative to the working directory.
pub const DEFAULT_SPECIAL_CASE_FILE: &str = "special_cases.json";

/// Input size above which a presentation explained by at most one disease is flagged.
pub const DEFAULT_BROAD_PRESENTATION_THRESHOLD: usize = 4;

/// Every candidate scoring below this marks the presentation as low-confidence.
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.15;

/// Fraction of input symptoms a prior special case must share to count as similar.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Tolerance used when comparing probabilities against 1.0.
pub const PROBABILITY_EPSILON: f64 = 1e-6;

/// Scores strictly above this are reported as high confidence.
pub const HIGH_CONFIDENCE_SCORE: f64 = 0.7;

/// Scores strictly above this (and not high) are reported as medium confidence.
pub const MEDIUM_CONFIDENCE_SCORE: f64 = 0.4;

/// Separator used to build special-case bundle keys.
pub const BUNDLE_KEY_SEPARATOR: &str = "|";

/// Audit event kind emitted for every completed diagnosis.
pub const AUDIT_DIAGNOSE_PATIENT: &str = "DIAGNOSE_PATIENT";

/// Audit event kind emitted when a special case is recorded.
pub const AUDIT_UPSERT_SPECIAL_CASE_WITH_PATIENT: &str = "UPSERT_SPECIAL_CASE_WITH_PATIENT";
