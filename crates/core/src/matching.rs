//! Match policies that decide which connected diseases qualify for a symptom set.

use crate::constants::{HIGH_CONFIDENCE_SCORE, MEDIUM_CONFIDENCE_SCORE};
use crate::probability::Aggregation;
use crate::DiagnosisError;
use medidx_types::{Disease, Symptom};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// How many symptom connections a disease needs in order to qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Connected to every input symptom.
    #[default]
    All,
    /// Connected to at least two input symptoms (behaves as `Wide` for a single symptom).
    Partial,
    /// Connected to at least one input symptom.
    Wide,
}

impl MatchMode {
    /// Minimum connection count for a disease to qualify, or `None` when nothing can qualify
    /// because no symptoms were given.
    pub fn min_connections(self, symptom_count: usize) -> Option<usize> {
        if symptom_count == 0 {
            return None;
        }
        Some(match self {
            MatchMode::All => symptom_count,
            MatchMode::Partial if symptom_count >= 2 => 2,
            MatchMode::Partial | MatchMode::Wide => 1,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::All => "all",
            MatchMode::Partial => "partial",
            MatchMode::Wide => "wide",
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = DiagnosisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "a" => Ok(MatchMode::All),
            "partial" | "p" => Ok(MatchMode::Partial),
            "wide" | "w" => Ok(MatchMode::Wide),
            _ => Err(DiagnosisError::UnknownMatchMode(s.to_string())),
        }
    }
}

/// Coarse label for an aggregated score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_CONFIDENCE_SCORE {
            ConfidenceLevel::High
        } else if score > MEDIUM_CONFIDENCE_SCORE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        };
        f.write_str(label)
    }
}

/// A disease that qualified under the selected match mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateDisease {
    pub disease: Disease,
    /// Distinct input symptoms the graph connects to this disease.
    pub connection_count: usize,
    /// Input symptoms with table evidence for this disease.
    pub matched_symptoms: BTreeSet<Symptom>,
    /// Aggregated table score; 0.0 when the table has no entry for the disease.
    pub aggregated_score: f64,
    pub confidence: ConfidenceLevel,
}

/// Reduces graph connection counts to the ordered qualifying set.
///
/// Only diseases present in `counts` (that is, connected to at least one input symptom) can
/// qualify. The result is ordered by connection count descending, then aggregated score
/// descending, then disease name ascending.
pub fn qualifying_diseases(
    mode: MatchMode,
    symptom_count: usize,
    counts: &BTreeMap<Disease, usize>,
    aggregation: &Aggregation,
) -> Vec<CandidateDisease> {
    let Some(needed) = mode.min_connections(symptom_count) else {
        return Vec::new();
    };

    let mut qualifying: Vec<CandidateDisease> = counts
        .iter()
        .filter(|(_, &count)| count >= needed)
        .map(|(disease, &connection_count)| {
            let scored = aggregation
                .candidates
                .iter()
                .find(|c| &c.disease == disease);
            let aggregated_score = scored.map(|c| c.score).unwrap_or(0.0);
            CandidateDisease {
                disease: disease.clone(),
                connection_count,
                matched_symptoms: scored
                    .map(|c| c.matched_symptoms.clone())
                    .unwrap_or_default(),
                aggregated_score,
                confidence: ConfidenceLevel::from_score(aggregated_score),
            }
        })
        .collect();

    qualifying.sort_by(|a, b| {
        b.connection_count
            .cmp(&a.connection_count)
            .then_with(|| b.aggregated_score.total_cmp(&a.aggregated_score))
            .then_with(|| a.disease.cmp(&b.disease))
    });

    tracing::debug!(
        mode = %mode,
        needed,
        qualifying = qualifying.len(),
        "applied match filter"
    );

    qualifying
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryKnowledgeGraph, KnowledgeGraph, QueryOptions};
    use crate::probability::aggregate;
    use crate::probability::tests::{d, reference_table, s};

    fn run(mode: MatchMode, symptoms: &[Symptom]) -> Vec<CandidateDisease> {
        let table = reference_table();
        let graph = InMemoryKnowledgeGraph::from_table(&table);
        let counts = graph
            .query(symptoms, &QueryOptions::default())
            .unwrap()
            .counts;
        let agg = aggregate(&table, symptoms);
        qualifying_diseases(mode, symptoms.len(), &counts, &agg)
    }

    fn names(candidates: &[CandidateDisease]) -> Vec<&str> {
        candidates.iter().map(|c| c.disease.as_str()).collect()
    }

    #[test]
    fn parse_accepts_names_and_shortcuts() {
        assert_eq!("ALL".parse::<MatchMode>().unwrap(), MatchMode::All);
        assert_eq!(" p ".parse::<MatchMode>().unwrap(), MatchMode::Partial);
        assert_eq!("wide".parse::<MatchMode>().unwrap(), MatchMode::Wide);
    }

    #[test]
    fn parse_rejects_unknown_mode() {
        let err = "most".parse::<MatchMode>().unwrap_err();
        assert!(matches!(err, DiagnosisError::UnknownMatchMode(m) if m == "most"));
    }

    #[test]
    fn partial_behaves_as_wide_for_a_single_symptom() {
        assert_eq!(MatchMode::Partial.min_connections(1), Some(1));
        assert_eq!(MatchMode::Partial.min_connections(3), Some(2));
        assert_eq!(MatchMode::All.min_connections(3), Some(3));
        assert_eq!(MatchMode::Wide.min_connections(0), None);
    }

    #[test]
    fn partial_example_qualifies_six_diseases_in_rank_order() {
        let input = [s("Cough"), s("Wheezing"), s("Fever"), s("Rash")];
        let qualifying = run(MatchMode::Partial, &input);

        assert_eq!(
            names(&qualifying),
            vec!["Dengue", "Asthma", "Flu", "COVID-19", "Influenza", "Pneumonia"]
        );
        assert!(qualifying.iter().all(|c| c.connection_count == 2));
    }

    #[test]
    fn all_mode_requires_every_symptom() {
        let qualifying = run(MatchMode::All, &[s("Cough"), s("Fever")]);
        assert_eq!(
            names(&qualifying),
            vec!["Flu", "COVID-19", "Influenza", "Pneumonia"]
        );

        let none = run(MatchMode::All, &[s("Wheezing"), s("Rash")]);
        assert!(none.is_empty());
    }

    #[test]
    fn wide_single_symptom_returns_exactly_its_diseases() {
        let qualifying = run(MatchMode::Wide, &[s("Fever")]);
        let mut got: Vec<&str> = names(&qualifying);
        got.sort();
        assert_eq!(
            got,
            vec!["COVID-19", "Dengue", "Flu", "Influenza", "Malaria", "Pneumonia", "Typhoid"]
        );
    }

    #[test]
    fn modes_are_nested() {
        let input = [s("Cough"), s("Wheezing"), s("Fever")];
        let set = |mode: MatchMode| -> BTreeSet<Disease> {
            run(mode, &input).into_iter().map(|c| c.disease).collect()
        };
        let (all, partial, wide) = (set(MatchMode::All), set(MatchMode::Partial), set(MatchMode::Wide));
        assert!(all.is_subset(&partial));
        assert!(partial.is_subset(&wide));
        assert!(wide.len() > partial.len());
    }

    #[test]
    fn connection_count_outranks_score() {
        let qualifying = run(MatchMode::Wide, &[s("Cough"), s("Wheezing")]);
        assert_eq!(qualifying[0].disease, d("Asthma"));
        assert_eq!(qualifying[0].connection_count, 2);
        assert_eq!(qualifying[0].confidence, ConfidenceLevel::Medium);
        assert_eq!(qualifying[1].disease, d("Flu"));
    }

    #[test]
    fn graph_only_disease_scores_zero() {
        let table = reference_table();
        let mut graph = InMemoryKnowledgeGraph::from_table(&table);
        graph.add_relation(d("Measles"), s("Rash"));
        let input = [s("Rash")];
        let counts = graph
            .query(&input, &QueryOptions::default())
            .unwrap()
            .counts;
        let agg = aggregate(&table, &input);
        let qualifying = qualifying_diseases(MatchMode::Wide, 1, &counts, &agg);

        assert_eq!(names(&qualifying), vec!["Dengue", "Measles"]);
        assert_eq!(qualifying[1].aggregated_score, 0.0);
        assert!(qualifying[1].matched_symptoms.is_empty());
        assert_eq!(qualifying[1].confidence, ConfidenceLevel::Low);
    }

    #[test]
    fn no_symptoms_qualifies_nothing() {
        for mode in [MatchMode::All, MatchMode::Partial, MatchMode::Wide] {
            assert!(run(mode, &[]).is_empty());
        }
    }
}
