//! Knowledge graph access.
//!
//! The engine needs two questions answered by the disease–symptom graph: how many of the input
//! symptoms each disease is connected to, and which input symptoms the graph has never heard
//! of. [`KnowledgeGraph::query`] answers both in one request, so a networked store issues a
//! single blocking round trip per diagnosis and [`QueryOptions::timeout`] bounds all of it.
//!
//! [`InMemoryKnowledgeGraph`] is an adjacency-map implementation used by the CLI and tests.

use crate::error::{GraphError, GraphResult};
use crate::probability::ProbabilityTable;
use medidx_types::{Disease, Symptom};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::{Duration, Instant};

/// Per-call options for graph queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Upper bound on how long the query may take. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Result of one graph query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphAnswer {
    /// For each disease connected to at least one input symptom, the number of distinct input
    /// symptoms it is connected to.
    pub counts: BTreeMap<Disease, usize>,
    /// Input symptoms the graph has no node for, in input order.
    pub unknown: Vec<Symptom>,
}

/// Read access to the disease–symptom knowledge graph.
pub trait KnowledgeGraph: Send + Sync {
    /// Connection counts and unknown symptoms for `symptoms`, as a single request.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] if the backing store cannot be reached or the query takes
    /// longer than `options.timeout`.
    fn query(&self, symptoms: &[Symptom], options: &QueryOptions) -> GraphResult<GraphAnswer>;
}

/// Disease–symptom adjacency held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryKnowledgeGraph {
    by_disease: BTreeMap<Disease, BTreeSet<Symptom>>,
    by_symptom: BTreeMap<Symptom, BTreeSet<Disease>>,
}

impl InMemoryKnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph with one edge per table entry.
    pub fn from_table(table: &ProbabilityTable) -> Self {
        let mut graph = Self::new();
        for symptom in table.symptoms() {
            for entry in table.lookup(symptom) {
                graph.add_relation(entry.disease.clone(), entry.symptom.clone());
            }
        }
        graph
    }

    /// Connects `disease` to `symptom`. Adding an existing edge is a no-op.
    pub fn add_relation(&mut self, disease: Disease, symptom: Symptom) {
        self.by_symptom
            .entry(symptom.clone())
            .or_default()
            .insert(disease.clone());
        self.by_disease.entry(disease).or_default().insert(symptom);
    }

    pub fn diseases(&self) -> impl Iterator<Item = &Disease> {
        self.by_disease.keys()
    }

    pub fn symptoms(&self) -> impl Iterator<Item = &Symptom> {
        self.by_symptom.keys()
    }

    /// Symptoms connected to `disease`.
    pub fn symptoms_of(&self, disease: &Disease) -> Option<&BTreeSet<Symptom>> {
        self.by_disease.get(disease)
    }

    /// Diseases connected to `symptom`.
    pub fn diseases_with(&self, symptom: &Symptom) -> Option<&BTreeSet<Disease>> {
        self.by_symptom.get(symptom)
    }

    pub fn is_empty(&self) -> bool {
        self.by_disease.is_empty()
    }
}

fn check_deadline(started: Instant, options: &QueryOptions) -> GraphResult<()> {
    match options.timeout {
        Some(limit) if started.elapsed() > limit => Err(GraphError::Timeout(limit)),
        _ => Ok(()),
    }
}

impl KnowledgeGraph for InMemoryKnowledgeGraph {
    fn query(&self, symptoms: &[Symptom], options: &QueryOptions) -> GraphResult<GraphAnswer> {
        let started = Instant::now();
        let mut answer = GraphAnswer::default();

        let distinct: HashSet<&Symptom> = symptoms.iter().collect();
        for symptom in distinct {
            if let Some(diseases) = self.by_symptom.get(symptom) {
                for disease in diseases {
                    *answer.counts.entry(disease.clone()).or_default() += 1;
                }
            }
        }

        answer.unknown = symptoms
            .iter()
            .filter(|s| !self.by_symptom.contains_key(*s))
            .cloned()
            .collect();

        check_deadline(started, options)?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::tests::{d, reference_table, s};

    #[test]
    fn from_table_creates_an_edge_per_entry() {
        let graph = InMemoryKnowledgeGraph::from_table(&reference_table());
        assert_eq!(graph.symptoms().count(), 4);
        assert_eq!(
            graph.symptoms_of(&d("Dengue")).unwrap(),
            &BTreeSet::from([s("Fever"), s("Rash")])
        );
        assert_eq!(graph.diseases_with(&s("Wheezing")).unwrap().len(), 1);
    }

    #[test]
    fn query_counts_distinct_input_symptoms() {
        let graph = InMemoryKnowledgeGraph::from_table(&reference_table());
        let counts = graph
            .query(
                &[s("Cough"), s("Fever"), s("Cough")],
                &QueryOptions::default(),
            )
            .unwrap()
            .counts;
        assert_eq!(counts[&d("Flu")], 2);
        assert_eq!(counts[&d("Malaria")], 1);
        assert_eq!(counts[&d("Bronchitis")], 1);
        assert_eq!(counts[&d("Dengue")], 1);
        assert_eq!(counts.len(), 11);
    }

    #[test]
    fn query_for_no_symptoms_is_empty() {
        let graph = InMemoryKnowledgeGraph::from_table(&reference_table());
        let answer = graph.query(&[], &QueryOptions::default()).unwrap();
        assert!(answer.counts.is_empty());
        assert!(answer.unknown.is_empty());
    }

    #[test]
    fn unknown_symptoms_preserve_input_order() {
        let mut graph = InMemoryKnowledgeGraph::new();
        graph.add_relation(d("Migraine"), s("Headache"));
        let answer = graph
            .query(
                &[s("Memory Loss"), s("Headache"), s("Leg Pain")],
                &QueryOptions::default(),
            )
            .unwrap();
        assert_eq!(answer.unknown, vec![s("Memory Loss"), s("Leg Pain")]);
        assert_eq!(answer.counts.len(), 1);
    }

    #[test]
    fn add_relation_is_idempotent() {
        let mut graph = InMemoryKnowledgeGraph::new();
        graph.add_relation(d("Flu"), s("Fever"));
        graph.add_relation(d("Flu"), s("Fever"));
        assert_eq!(graph.symptoms_of(&d("Flu")).unwrap().len(), 1);
    }
}
