//! Symptom → disease probability table and the aggregation stage built on it.
//!
//! The table is precomputed data: for each symptom, an ordered list of diseases with the
//! probability of that disease given the symptom. Probabilities for one symptom sum to at most
//! 1.0; the remainder is the implicit "other/unknown" mass.
//!
//! [`aggregate`] is a pure function of the table and an input symptom set. It produces the
//! per-symptom breakdown shown to the operator and a combined ranking in which each disease is
//! scored by the mean of its probabilities across only the input symptoms that mention it.

use crate::constants::PROBABILITY_EPSILON;
use crate::validation::validate_probability;
use crate::{DiagnosisError, DiagnosisResult};
use medidx_types::{Disease, Symptom};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One row of the probability table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityEntry {
    pub symptom: Symptom,
    pub disease: Disease,
    pub probability: f64,
}

/// Descending probability, then disease name ascending.
fn by_probability(a: &ProbabilityEntry, b: &ProbabilityEntry) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| a.disease.cmp(&b.disease))
}

/// Read-only mapping from symptom to its ordered disease probabilities.
///
/// Construct it once at startup and share it (for example behind an `Arc`) across requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbabilityTable {
    entries: BTreeMap<Symptom, Vec<ProbabilityEntry>>,
}

impl ProbabilityTable {
    /// Builds a table from `(symptom, disease, probability)` rows.
    ///
    /// Rows for the same symptom are sorted by descending probability. A repeated
    /// `(symptom, disease)` pair keeps the last probability given.
    ///
    /// # Errors
    ///
    /// Returns `DiagnosisError::InvalidKnowledge` if a probability lies outside `[0, 1]` or the
    /// probabilities for one symptom sum to more than 1.0.
    pub fn from_entries<I>(rows: I) -> DiagnosisResult<Self>
    where
        I: IntoIterator<Item = (Symptom, Disease, f64)>,
    {
        let mut grouped: BTreeMap<Symptom, BTreeMap<Disease, f64>> = BTreeMap::new();
        for (symptom, disease, probability) in rows {
            validate_probability(symptom.as_str(), disease.as_str(), probability)?;
            grouped
                .entry(symptom)
                .or_default()
                .insert(disease, probability);
        }

        let mut entries = BTreeMap::new();
        for (symptom, diseases) in grouped {
            let total: f64 = diseases.values().sum();
            if total > 1.0 + PROBABILITY_EPSILON {
                return Err(DiagnosisError::InvalidKnowledge(format!(
                    "probabilities for {symptom} sum to {total:.4}, which exceeds 1.0"
                )));
            }

            let mut rows: Vec<ProbabilityEntry> = diseases
                .into_iter()
                .map(|(disease, probability)| ProbabilityEntry {
                    symptom: symptom.clone(),
                    disease,
                    probability,
                })
                .collect();
            rows.sort_by(by_probability);
            entries.insert(symptom, rows);
        }

        Ok(Self { entries })
    }

    /// Ordered disease probabilities for `symptom`; empty for a symptom the table does not know.
    pub fn lookup(&self, symptom: &Symptom) -> &[ProbabilityEntry] {
        self.entries.get(symptom).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All symptoms with table data, in name order.
    pub fn symptoms(&self) -> impl Iterator<Item = &Symptom> {
        self.entries.keys()
    }

    pub fn contains(&self, symptom: &Symptom) -> bool {
        self.entries.contains_key(symptom)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Display breakdown for one input symptom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomBreakdown {
    pub symptom: Symptom,
    /// Non-zero table entries, highest probability first. Empty means "no data".
    pub entries: Vec<ProbabilityEntry>,
}

impl SymptomBreakdown {
    /// The most probable disease for this symptom, if any.
    pub fn top(&self) -> Option<&ProbabilityEntry> {
        self.entries.first()
    }

    pub fn has_data(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// A disease ranked by aggregated table evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDisease {
    pub disease: Disease,
    /// Mean probability across the input symptoms that list this disease.
    pub score: f64,
    /// Input symptoms under which this disease has a table entry.
    pub matched_symptoms: BTreeSet<Symptom>,
}

/// Output of the aggregation stage for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregation {
    /// One breakdown per input symptom, in input order.
    pub breakdown: Vec<SymptomBreakdown>,
    /// Diseases by descending score, ties broken by name ascending.
    pub candidates: Vec<ScoredDisease>,
}

impl Aggregation {
    /// Aggregated score for `disease`, if it appeared in any breakdown.
    pub fn score_of(&self, disease: &Disease) -> Option<f64> {
        self.candidates
            .iter()
            .find(|c| &c.disease == disease)
            .map(|c| c.score)
    }
}

/// Builds the breakdown and the combined ranking for `symptoms`.
///
/// Repeated symptoms are only counted once. An empty input yields an empty aggregation.
pub fn aggregate(table: &ProbabilityTable, symptoms: &[Symptom]) -> Aggregation {
    let mut seen = HashSet::new();
    let mut breakdown = Vec::with_capacity(symptoms.len());
    let mut totals: BTreeMap<Disease, (f64, usize, BTreeSet<Symptom>)> = BTreeMap::new();

    for symptom in symptoms {
        if !seen.insert(symptom) {
            continue;
        }

        let entries: Vec<ProbabilityEntry> = table
            .lookup(symptom)
            .iter()
            .filter(|e| e.probability > 0.0)
            .cloned()
            .collect();

        for entry in &entries {
            let slot = totals.entry(entry.disease.clone()).or_default();
            slot.0 += entry.probability;
            slot.1 += 1;
            slot.2.insert(symptom.clone());
        }

        breakdown.push(SymptomBreakdown {
            symptom: symptom.clone(),
            entries,
        });
    }

    let mut candidates: Vec<ScoredDisease> = totals
        .into_iter()
        .map(|(disease, (sum, count, matched_symptoms))| ScoredDisease {
            disease,
            score: sum / count as f64,
            matched_symptoms,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.disease.cmp(&b.disease))
    });

    tracing::debug!(
        symptoms = breakdown.len(),
        candidates = candidates.len(),
        "aggregated symptom probabilities"
    );

    Aggregation {
        breakdown,
        candidates,
    }
}
