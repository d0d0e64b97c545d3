//! Special-case detection.
//!
//! A special case is a symptom presentation the known disease model explains badly. Detection
//! is a pure function over the request's evidence; persisting the resulting [`SpecialCase`] is
//! the engine's job and never changes the diagnosis returned to the operator.
//!
//! ## Rules
//!
//! Any one rule firing is enough:
//!
//! 1. **No qualifying disease**: symptoms were given but the match filter qualified nothing.
//! 2. **Broad presentation**: more symptoms than the configured threshold, explained by at most
//!    one qualifying disease.
//! 3. **Contradictory certainty**: two or more symptoms are each 100% certain for different
//!    diseases.
//! 4. **Unknown symptoms**: the knowledge graph has no node for some input symptom.
//! 5. **Low confidence**: there are scored candidates, but every aggregated score is below the
//!    configured low-confidence threshold.

use crate::config::DiagnosisConfig;
use crate::constants::{BUNDLE_KEY_SEPARATOR, PROBABILITY_EPSILON};
use crate::matching::CandidateDisease;
use crate::probability::Aggregation;
use chrono::{DateTime, Utc};
use medidx_types::{Disease, PatientName, Symptom};
use serde::Serialize;
use std::collections::BTreeSet;

/// A rule that fired for the current request, with the evidence that made it fire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SpecialCaseTrigger {
    NoQualifyingDisease,
    BroadPresentation {
        symptom_count: usize,
        qualifying_count: usize,
        threshold: usize,
    },
    ContradictoryCertainty {
        /// Each certain symptom paired with the disease it is certain for.
        certainties: Vec<(Symptom, Disease)>,
    },
    UnknownSymptoms {
        symptoms: Vec<Symptom>,
    },
    LowConfidence {
        best_score: f64,
        threshold: f64,
    },
}

impl SpecialCaseTrigger {
    /// Human-readable explanation naming the rule.
    pub fn describe(&self) -> String {
        match self {
            SpecialCaseTrigger::NoQualifyingDisease => {
                "no known disease sufficiently explains the presented symptoms".to_string()
            }
            SpecialCaseTrigger::BroadPresentation {
                symptom_count,
                qualifying_count,
                threshold,
            } => format!(
                "broad presentation: {symptom_count} symptoms (threshold {threshold}) explained by {qualifying_count} disease(s)"
            ),
            SpecialCaseTrigger::ContradictoryCertainty { certainties } => {
                let pairs: Vec<String> = certainties
                    .iter()
                    .map(|(s, d)| format!("{s} => {d}"))
                    .collect();
                format!("contradictory certainty: {}", pairs.join(", "))
            }
            SpecialCaseTrigger::UnknownSymptoms { symptoms } => {
                let names: Vec<&str> = symptoms.iter().map(Symptom::as_str).collect();
                format!("unknown symptoms: {}", names.join(", "))
            }
            SpecialCaseTrigger::LowConfidence {
                best_score,
                threshold,
            } => format!(
                "low confidence: best aggregated score {:.1}% is below {:.1}%",
                best_score * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// A presentation flagged for expert review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialCase {
    pub patient: PatientName,
    /// Sorted, de-duplicated symptom bundle.
    pub symptoms: Vec<Symptom>,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub triggers: Vec<SpecialCaseTrigger>,
}

impl SpecialCase {
    /// Builds a special case from the triggers that fired, or `None` if none did.
    pub fn from_triggers(
        patient: PatientName,
        symptoms: &[Symptom],
        triggers: Vec<SpecialCaseTrigger>,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if triggers.is_empty() {
            return None;
        }

        let reason = triggers
            .iter()
            .map(SpecialCaseTrigger::describe)
            .collect::<Vec<_>>()
            .join("; ");

        Some(Self {
            patient,
            symptoms: symptoms
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            timestamp,
            reason,
            triggers,
        })
    }

    pub fn bundle_key(&self) -> String {
        bundle_key(&self.symptoms)
    }
}

/// Stable key for a symptom bundle, such as `Cough|Leg Pain|Memory Loss`.
pub fn bundle_key(symptoms: &[Symptom]) -> String {
    symptoms
        .iter()
        .map(Symptom::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(BUNDLE_KEY_SEPARATOR)
}

/// Evidence gathered for one request, as seen by the detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub symptoms: &'a [Symptom],
    pub aggregation: &'a Aggregation,
    pub qualifying: &'a [CandidateDisease],
    pub unknown_symptoms: &'a [Symptom],
}

/// Evaluates every rule and returns the ones that fired, in rule order.
pub fn detect(cfg: &DiagnosisConfig, input: &DetectionInput<'_>) -> Vec<SpecialCaseTrigger> {
    let mut triggers = Vec::new();
    if input.symptoms.is_empty() {
        return triggers;
    }

    if input.qualifying.is_empty() {
        triggers.push(SpecialCaseTrigger::NoQualifyingDisease);
    }

    let threshold = cfg.broad_presentation_threshold();
    if input.symptoms.len() > threshold && input.qualifying.len() <= 1 {
        triggers.push(SpecialCaseTrigger::BroadPresentation {
            symptom_count: input.symptoms.len(),
            qualifying_count: input.qualifying.len(),
            threshold,
        });
    }

    let certainties = certain_symptoms(input.aggregation);
    let distinct: BTreeSet<&Disease> = certainties.iter().map(|(_, d)| d).collect();
    if distinct.len() >= 2 {
        triggers.push(SpecialCaseTrigger::ContradictoryCertainty { certainties });
    }

    if !input.unknown_symptoms.is_empty() {
        triggers.push(SpecialCaseTrigger::UnknownSymptoms {
            symptoms: input.unknown_symptoms.to_vec(),
        });
    }

    let low = cfg.low_confidence_threshold();
    if let Some(best) = input.aggregation.candidates.first() {
        // candidates are sorted, so the first score is the best one
        if best.score < low {
            triggers.push(SpecialCaseTrigger::LowConfidence {
                best_score: best.score,
                threshold: low,
            });
        }
    }

    if !triggers.is_empty() {
        tracing::debug!(
            rules = triggers.len(),
            "special-case rules fired for {}",
            bundle_key(input.symptoms)
        );
    }

    triggers
}

/// Symptoms whose top-ranked disease has probability 1.0, in input order.
fn certain_symptoms(aggregation: &Aggregation) -> Vec<(Symptom, Disease)> {
    aggregation
        .breakdown
        .iter()
        .filter_map(|b| {
            b.top()
                .filter(|top| top.probability >= 1.0 - PROBABILITY_EPSILON)
                .map(|top| (b.symptom.clone(), top.disease.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryKnowledgeGraph, KnowledgeGraph, QueryOptions};
    use crate::matching::{qualifying_diseases, MatchMode};
    use crate::probability::tests::{d, reference_table, s};
    use crate::probability::{aggregate, ProbabilityTable};

    fn evaluate_with(
        cfg: &DiagnosisConfig,
        table: &ProbabilityTable,
        mode: MatchMode,
        symptoms: &[Symptom],
    ) -> Vec<SpecialCaseTrigger> {
        let graph = InMemoryKnowledgeGraph::from_table(table);
        let answer = graph.query(symptoms, &QueryOptions::default()).unwrap();
        let aggregation = aggregate(table, symptoms);
        let qualifying = qualifying_diseases(mode, symptoms.len(), &answer.counts, &aggregation);
        detect(
            cfg,
            &DetectionInput {
                symptoms,
                aggregation: &aggregation,
                qualifying: &qualifying,
                unknown_symptoms: &answer.unknown,
            },
        )
    }

    fn evaluate(mode: MatchMode, symptoms: &[Symptom]) -> Vec<SpecialCaseTrigger> {
        evaluate_with(&DiagnosisConfig::default(), &reference_table(), mode, symptoms)
    }

    fn has_rule(triggers: &[SpecialCaseTrigger], f: fn(&SpecialCaseTrigger) -> bool) -> bool {
        triggers.iter().any(f)
    }

    #[test]
    fn empty_input_never_triggers() {
        assert!(evaluate(MatchMode::All, &[]).is_empty());
    }

    #[test]
    fn contradictory_certainty_fires_for_wheezing_and_rash() {
        let triggers = evaluate(MatchMode::Wide, &[s("Wheezing"), s("Rash")]);
        assert_eq!(
            triggers,
            vec![SpecialCaseTrigger::ContradictoryCertainty {
                certainties: vec![(s("Wheezing"), d("Asthma")), (s("Rash"), d("Dengue"))],
            }]
        );
    }

    #[test]
    fn single_certain_symptom_does_not_fire() {
        assert!(evaluate(MatchMode::All, &[s("Wheezing")]).is_empty());
    }

    #[test]
    fn same_certain_disease_is_not_contradictory() {
        let table = ProbabilityTable::from_entries([
            (s("Koplik Spots"), d("Measles"), 1.0),
            (s("Morbilliform Rash"), d("Measles"), 1.0),
        ])
        .unwrap();
        let triggers = evaluate_with(
            &DiagnosisConfig::default(),
            &table,
            MatchMode::All,
            &[s("Koplik Spots"), s("Morbilliform Rash")],
        );
        assert!(triggers.is_empty());
    }

    #[test]
    fn no_qualifying_disease_fires_in_all_mode() {
        let triggers = evaluate(MatchMode::All, &[s("Wheezing"), s("Rash")]);
        assert_eq!(triggers[0], SpecialCaseTrigger::NoQualifyingDisease);
    }

    #[test]
    fn unknown_symptoms_fire_and_are_listed() {
        let triggers = evaluate(MatchMode::Wide, &[s("Fever"), s("Memory Loss")]);
        assert!(triggers.contains(&SpecialCaseTrigger::UnknownSymptoms {
            symptoms: vec![s("Memory Loss")],
        }));
    }

    #[test]
    fn broad_presentation_fires_above_threshold() {
        let cfg = DiagnosisConfig::new(2, 0.0, 0.5, false, None).unwrap();
        let triggers = evaluate_with(
            &cfg,
            &reference_table(),
            MatchMode::All,
            &[s("Cough"), s("Wheezing"), s("Fever")],
        );
        assert!(has_rule(&triggers, |t| matches!(
            t,
            SpecialCaseTrigger::BroadPresentation {
                symptom_count: 3,
                qualifying_count: 0,
                threshold: 2
            }
        )));
    }

    #[test]
    fn broad_presentation_needs_more_than_threshold() {
        let cfg = DiagnosisConfig::new(3, 0.0, 0.5, false, None).unwrap();
        let triggers = evaluate_with(
            &cfg,
            &reference_table(),
            MatchMode::All,
            &[s("Cough"), s("Wheezing"), s("Fever")],
        );
        assert!(!has_rule(&triggers, |t| matches!(
            t,
            SpecialCaseTrigger::BroadPresentation { .. }
        )));
    }

    #[test]
    fn low_confidence_fires_when_every_score_is_weak() {
        let triggers = evaluate(MatchMode::Wide, &[s("Cough")]);
        // Flu tops Cough at 0.20, above the 0.15 default
        assert!(triggers.is_empty());

        let table = ProbabilityTable::from_entries([
            (s("Fatigue"), d("Anaemia"), 0.10),
            (s("Fatigue"), d("Hypothyroidism"), 0.08),
        ])
        .unwrap();
        let triggers = evaluate_with(
            &DiagnosisConfig::default(),
            &table,
            MatchMode::Wide,
            &[s("Fatigue")],
        );
        assert!(has_rule(&triggers, |t| matches!(
            t,
            SpecialCaseTrigger::LowConfidence { .. }
        )));
    }

    #[test]
    fn special_case_reason_names_each_rule() {
        let case = SpecialCase::from_triggers(
            PatientName::new("Jane Doe").unwrap(),
            &[s("Rash"), s("Wheezing"), s("Rash")],
            vec![
                SpecialCaseTrigger::NoQualifyingDisease,
                SpecialCaseTrigger::ContradictoryCertainty {
                    certainties: vec![(s("Wheezing"), d("Asthma")), (s("Rash"), d("Dengue"))],
                },
            ],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(case.symptoms, vec![s("Rash"), s("Wheezing")]);
        assert_eq!(case.bundle_key(), "Rash|Wheezing");
        assert!(case.reason.contains("no known disease"));
        assert!(case.reason.contains("Wheezing => Asthma"));
    }

    #[test]
    fn no_triggers_means_no_special_case() {
        let case = SpecialCase::from_triggers(
            PatientName::new("Jane Doe").unwrap(),
            &[s("Cough")],
            Vec::new(),
            Utc::now(),
        );
        assert!(case.is_none());
    }

    #[test]
    fn bundle_key_sorts_and_deduplicates() {
        assert_eq!(
            bundle_key(&[s("fever"), s("Cough"), s("FEVER")]),
            "Cough|Fever"
        );
    }
}
