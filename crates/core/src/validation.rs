//! Input validation utilities.
//!
//! This module turns raw operator input into normalized values before it reaches the inference
//! stages. Nothing here fails a request: malformed entries are filtered out and reported back so
//! the caller can surface them as a warning.

use crate::{DiagnosisError, DiagnosisResult};
use medidx_types::Symptom;
use std::collections::HashSet;

/// Outcome of normalizing a raw symptom list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSymptoms {
    /// Distinct symptoms in first-seen order.
    pub symptoms: Vec<Symptom>,
    /// Raw entries that could not be turned into a [`Symptom`].
    pub skipped: Vec<String>,
}

/// Normalizes, validates and de-duplicates operator-supplied symptom names.
///
/// Entries are compared after normalization, so `"cough"` and `" Cough "` collapse to a single
/// symptom. Entries that cannot be normalized, blank ones included, are listed in
/// [`NormalizedSymptoms::skipped`] as given.
pub fn normalize_symptoms<I, S>(raw: I) -> NormalizedSymptoms
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = NormalizedSymptoms::default();

    for entry in raw {
        let entry = entry.as_ref();
        match Symptom::new(entry) {
            Ok(symptom) => {
                if seen.insert(symptom.clone()) {
                    out.symptoms.push(symptom);
                }
            }
            Err(e) => {
                tracing::debug!("skipping symptom entry {:?}: {}", entry, e);
                out.skipped.push(entry.to_string());
            }
        }
    }

    out
}

/// Splits a comma-separated symptom list as typed at a prompt.
///
/// Empty pieces from stray or trailing commas are not entries and are left out.
pub fn split_symptom_list(input: &str) -> Vec<&str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Validates that a probability is a finite value within `[0, 1]`.
///
/// # Errors
///
/// Returns a `DiagnosisError::InvalidKnowledge` naming the offending pair.
pub fn validate_probability(symptom: &str, disease: &str, probability: f64) -> DiagnosisResult<()> {
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(DiagnosisError::InvalidKnowledge(format!(
            "probability for {symptom} -> {disease} must be within 0.0-1.0, got {probability}"
        )));
    }
    Ok(())
}
