//! Knowledge file loading.
//!
//! A knowledge file is YAML with two optional sections:
//!
//! ```yaml
//! probabilities:        # symptom -> disease -> P(disease | symptom)
//!   Cough: { Flu: 0.20, Asthma: 0.12 }
//!   Wheezing: { Asthma: 1.0 }
//! relations:            # disease -> symptoms, extra graph edges
//!   Migraine: [Headache, Nausea]
//! ```
//!
//! Every probability entry is also a graph edge. A symptom that only appears under
//! `relations` gets probabilities derived from the graph: each connected disease is weighted by
//! `1 / (symptom_count + 1)`, so diseases with fewer symptoms are more likely given the symptom,
//! and the weights are normalized to sum to 1.

use crate::graph::InMemoryKnowledgeGraph;
use crate::probability::ProbabilityTable;
use crate::{DiagnosisError, DiagnosisResult};
use medidx_types::{Disease, Symptom, TextError};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct KnowledgeFile {
    #[serde(default)]
    probabilities: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    relations: BTreeMap<String, Vec<String>>,
}

/// Probability table and knowledge graph loaded from one file.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    pub table: ProbabilityTable,
    pub graph: InMemoryKnowledgeGraph,
}

fn symptom(name: &str) -> DiagnosisResult<Symptom> {
    Symptom::new(name).map_err(|e| invalid_name("symptom", name, e))
}

fn disease(name: &str) -> DiagnosisResult<Disease> {
    Disease::new(name).map_err(|e| invalid_name("disease", name, e))
}

fn invalid_name(what: &str, name: &str, e: TextError) -> DiagnosisError {
    DiagnosisError::InvalidKnowledge(format!("invalid {what} name {name:?}: {e}"))
}

impl KnowledgeBase {
    /// Parses a knowledge file from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `DiagnosisError::YamlDeserialization` for malformed YAML and
    /// `DiagnosisError::InvalidKnowledge` for bad names or probabilities.
    pub fn from_yaml_str(text: &str) -> DiagnosisResult<Self> {
        let file: KnowledgeFile = if text.trim().is_empty() {
            KnowledgeFile::default()
        } else {
            serde_yaml::from_str(text).map_err(DiagnosisError::YamlDeserialization)?
        };

        let mut graph = InMemoryKnowledgeGraph::new();
        let mut rows = Vec::new();

        for (sym_name, diseases) in &file.probabilities {
            let sym = symptom(sym_name)?;
            for (dis_name, &p) in diseases {
                let dis = disease(dis_name)?;
                graph.add_relation(dis.clone(), sym.clone());
                rows.push((sym.clone(), dis, p));
            }
        }

        for (dis_name, symptoms) in &file.relations {
            let dis = disease(dis_name)?;
            for sym_name in symptoms {
                graph.add_relation(dis.clone(), symptom(sym_name)?);
            }
        }

        let explicit: BTreeSet<Symptom> =
            rows.iter().map(|(s, _, _)| s.clone()).collect();
        let derived = derive_probabilities(&graph, |s| !explicit.contains(s));
        if !derived.is_empty() {
            tracing::debug!(
                rows = derived.len(),
                "derived probabilities for relation-only symptoms"
            );
        }
        rows.extend(derived);

        let table = ProbabilityTable::from_entries(rows)?;
        tracing::info!(
            symptoms = graph.symptoms().count(),
            diseases = graph.diseases().count(),
            "loaded knowledge base"
        );

        Ok(Self { table, graph })
    }

    /// Reads and parses a knowledge file.
    pub fn load(path: &Path) -> DiagnosisResult<Self> {
        let text = std::fs::read_to_string(path).map_err(DiagnosisError::FileRead)?;
        Self::from_yaml_str(&text)
    }
}

/// Probabilities for each graph symptom selected by `include`, weighted by inverse disease
/// symptom count and normalized per symptom.
pub fn derive_probabilities(
    graph: &InMemoryKnowledgeGraph,
    include: impl Fn(&Symptom) -> bool,
) -> Vec<(Symptom, Disease, f64)> {
    let mut rows = Vec::new();

    for sym in graph.symptoms().filter(|s| include(s)) {
        let Some(diseases) = graph.diseases_with(sym) else {
            continue;
        };

        let weights: Vec<(&Disease, f64)> = diseases
            .iter()
            .map(|d| {
                let n = graph.symptoms_of(d).map_or(0, |s| s.len());
                (d, 1.0 / (n as f64 + 1.0))
            })
            .collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            continue;
        }

        rows.extend(
            weights
                .into_iter()
                .map(|(d, w)| (sym.clone(), d.clone(), (w / total).min(1.0))),
        );
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{KnowledgeGraph, QueryOptions};
    use crate::probability::tests::{d, s};
    use std::io::Write;

    const SAMPLE: &str = r#"
probabilities:
  cough: { Flu: 0.20, Asthma: 0.12 }
  Wheezing: { Asthma: 1.0 }
relations:
  Migraine: [Headache, Nausea]
  Gastroenteritis: [Nausea, Diarrhoea, Fever]
"#;

    #[test]
    fn probabilities_become_table_rows_and_edges() {
        let kb = KnowledgeBase::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(kb.table.lookup(&s("Cough"))[0].disease, d("Flu"));
        assert!(kb
            .graph
            .diseases_with(&s("Wheezing"))
            .unwrap()
            .contains(&d("Asthma")));
    }

    #[test]
    fn relation_only_symptoms_get_derived_probabilities() {
        let kb = KnowledgeBase::from_yaml_str(SAMPLE).unwrap();

        // Migraine has 2 symptoms (weight 1/3), Gastroenteritis has 3 (weight 1/4)
        let nausea = kb.table.lookup(&s("Nausea"));
        assert_eq!(nausea.len(), 2);
        assert_eq!(nausea[0].disease, d("Migraine"));
        let expected = (1.0 / 3.0) / (1.0 / 3.0 + 1.0 / 4.0);
        assert!((nausea[0].probability - expected).abs() < 1e-12);
        let sum: f64 = nausea.iter().map(|e| e.probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);

        // single-disease symptom is certain
        assert_eq!(kb.table.lookup(&s("Headache"))[0].probability, 1.0);
    }

    #[test]
    fn explicit_probabilities_are_not_overridden() {
        let kb = KnowledgeBase::from_yaml_str(
            "probabilities:\n  Fever: { Flu: 0.3 }\nrelations:\n  Malaria: [Fever]\n",
        )
        .unwrap();
        let fever = kb.table.lookup(&s("Fever"));
        assert_eq!(fever.len(), 1);
        assert_eq!(fever[0].probability, 0.3);

        let counts = kb
            .graph
            .query(&[s("Fever")], &QueryOptions::default())
            .unwrap()
            .counts;
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn empty_file_is_an_empty_knowledge_base() {
        let kb = KnowledgeBase::from_yaml_str("  \n").unwrap();
        assert!(kb.table.is_empty());
        assert!(kb.graph.is_empty());
    }

    #[test]
    fn bad_probability_is_rejected() {
        let err = KnowledgeBase::from_yaml_str("probabilities:\n  Cough: { Flu: 1.5 }\n")
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidKnowledge(_)));
    }

    #[test]
    fn blank_names_are_rejected() {
        let err =
            KnowledgeBase::from_yaml_str("relations:\n  Flu: ['  ']\n").unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidKnowledge(_)));
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let err = KnowledgeBase::from_yaml_str("probabilities: [1, 2").unwrap_err();
        assert!(matches!(err, DiagnosisError::YamlDeserialization(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let kb = KnowledgeBase::load(file.path()).unwrap();
        assert!(kb.table.contains(&s("Wheezing")));
    }

    #[test]
    fn load_of_missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KnowledgeBase::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, DiagnosisError::FileRead(_)));
    }
}
