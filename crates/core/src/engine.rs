//! Diagnosis service.
//!
//! [`DiagnosisService`] runs one request through the pipeline:
//!
//! 1. normalize the raw symptom list (invalid entries become a warning),
//! 2. look up prior special cases for the same or similar bundles,
//! 3. aggregate table probabilities,
//! 4. query the knowledge graph and apply the match filter,
//! 5. run special-case detection and hand any case to the store,
//! 6. emit audit events.
//!
//! Only a graph failure aborts a request. Store and audit failures are collected as
//! [`DiagnosisWarning`]s on the returned report. The service holds no per-request state, so a
//! single instance can serve concurrent requests.

use crate::audit::{AuditEmitter, AuditEvent};
use crate::config::DiagnosisConfig;
use crate::constants::{AUDIT_DIAGNOSE_PATIENT, AUDIT_UPSERT_SPECIAL_CASE_WITH_PATIENT};
use crate::error::{DiagnosisResult, DiagnosisWarning};
use crate::graph::{GraphAnswer, KnowledgeGraph, QueryOptions};
use crate::matching::{qualifying_diseases, CandidateDisease, MatchMode};
use crate::probability::{aggregate, Aggregation, ProbabilityTable, ScoredDisease, SymptomBreakdown};
use crate::special_case::{detect, DetectionInput, SpecialCase};
use crate::store::{SimilarCase, SpecialCaseRecord, SpecialCaseStore};
use crate::validation::normalize_symptoms;
use chrono::Utc;
use medidx_types::{PatientName, Symptom};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// A single operator-submitted diagnosis request.
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub patient: PatientName,
    /// Symptom names as typed; normalized by the service.
    pub symptoms: Vec<String>,
    pub mode: MatchMode,
}

impl DiagnosisRequest {
    pub fn new<I, S>(patient: PatientName, symptoms: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patient,
            symptoms: symptoms.into_iter().map(Into::into).collect(),
            mode,
        }
    }
}

/// Everything the shell needs to render a diagnosis.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    pub patient: PatientName,
    pub symptoms: Vec<Symptom>,
    pub mode: MatchMode,
    /// Set when ALL mode qualified nothing and the filter was re-run in another mode.
    pub fallback_mode: Option<MatchMode>,
    pub breakdown: Vec<SymptomBreakdown>,
    pub candidates: Vec<ScoredDisease>,
    pub qualifying: Vec<CandidateDisease>,
    pub best_guess: Option<CandidateDisease>,
    pub unknown_symptoms: Vec<Symptom>,
    /// Special case detected for this request, if any.
    pub special_case: Option<SpecialCase>,
    /// Store record after recording `special_case`, if the store accepted it.
    pub recorded_special_case: Option<SpecialCaseRecord>,
    /// Record for this exact bundle as it stood before the request.
    pub prior_special_case: Option<SpecialCaseRecord>,
    pub similar_cases: Vec<SimilarCase>,
    pub warnings: Vec<DiagnosisWarning>,
}

/// Pure inference over injected collaborators - no I/O of its own.
#[derive(Clone)]
pub struct DiagnosisService {
    cfg: Arc<DiagnosisConfig>,
    table: Arc<ProbabilityTable>,
    graph: Arc<dyn KnowledgeGraph>,
    store: Arc<dyn SpecialCaseStore>,
    audit: Arc<dyn AuditEmitter>,
}

impl DiagnosisService {
    pub fn new(
        cfg: Arc<DiagnosisConfig>,
        table: Arc<ProbabilityTable>,
        graph: Arc<dyn KnowledgeGraph>,
        store: Arc<dyn SpecialCaseStore>,
        audit: Arc<dyn AuditEmitter>,
    ) -> Self {
        Self {
            cfg,
            table,
            graph,
            store,
            audit,
        }
    }

    pub fn config(&self) -> &DiagnosisConfig {
        &self.cfg
    }

    /// Ordered disease probabilities for one symptom, as typed by the operator.
    ///
    /// Unknown or malformed symptoms yield an empty breakdown.
    pub fn probabilities(&self, symptom: &str) -> Vec<SymptomBreakdown> {
        let normalized = normalize_symptoms([symptom]);
        aggregate(&self.table, &normalized.symptoms).breakdown
    }

    /// Aggregation stage only: breakdown and ranked candidates for `symptoms`.
    pub fn aggregate(&self, symptoms: &[Symptom]) -> Aggregation {
        aggregate(&self.table, symptoms)
    }

    /// Runs a full diagnosis.
    ///
    /// # Errors
    ///
    /// Returns `DiagnosisError::GraphUnavailable` if the knowledge graph cannot be queried.
    /// Nothing is recorded or emitted in that case.
    pub fn diagnose(&self, request: DiagnosisRequest) -> DiagnosisResult<DiagnosisReport> {
        let DiagnosisRequest {
            patient,
            symptoms: raw,
            mode,
        } = request;
        let mut warnings = Vec::new();

        let normalized = normalize_symptoms(&raw);
        if !normalized.skipped.is_empty() {
            tracing::warn!(
                "skipped {} invalid symptom entries",
                normalized.skipped.len()
            );
            warnings.push(DiagnosisWarning::SkippedSymptoms {
                entries: normalized.skipped,
            });
        }
        let symptoms = normalized.symptoms;

        let aggregation = aggregate(&self.table, &symptoms);

        let GraphAnswer {
            counts,
            unknown: unknown_symptoms,
        } = if symptoms.is_empty() {
            GraphAnswer::default()
        } else {
            let options = QueryOptions {
                timeout: self.cfg.graph_timeout(),
            };
            self.graph.query(&symptoms, &options)?
        };

        let (prior_special_case, similar_cases) = self.prior_cases(&symptoms, &mut warnings);

        let mut qualifying = qualifying_diseases(mode, symptoms.len(), &counts, &aggregation);
        let mut fallback_mode = None;
        if qualifying.is_empty()
            && mode == MatchMode::All
            && symptoms.len() >= 2
            && self.cfg.all_mode_fallback()
        {
            qualifying = qualifying_diseases(
                MatchMode::Partial,
                symptoms.len(),
                &counts,
                &aggregation,
            );
            if !qualifying.is_empty() {
                tracing::info!("no disease matched all symptoms, showing partial matches");
                fallback_mode = Some(MatchMode::Partial);
            }
        }

        let triggers = detect(
            &self.cfg,
            &DetectionInput {
                symptoms: &symptoms,
                aggregation: &aggregation,
                qualifying: &qualifying,
                unknown_symptoms: &unknown_symptoms,
            },
        );
        let special_case =
            SpecialCase::from_triggers(patient.clone(), &symptoms, triggers, Utc::now());
        let recorded_special_case = special_case
            .clone()
            .and_then(|case| self.record_special_case(case, &mut warnings));

        let best_guess = qualifying.first().cloned();
        self.emit(
            AUDIT_DIAGNOSE_PATIENT,
            diagnosis_detail(&patient, &symptoms, mode, &qualifying, best_guess.as_ref()),
            &mut warnings,
        );

        tracing::info!(
            patient = %patient,
            symptoms = symptoms.len(),
            qualifying = qualifying.len(),
            special_case = special_case.is_some(),
            "diagnosis complete"
        );

        Ok(DiagnosisReport {
            patient,
            symptoms,
            mode,
            fallback_mode,
            breakdown: aggregation.breakdown,
            candidates: aggregation.candidates,
            qualifying,
            best_guess,
            unknown_symptoms,
            special_case,
            recorded_special_case,
            prior_special_case,
            similar_cases,
            warnings,
        })
    }

    fn prior_cases(
        &self,
        symptoms: &[Symptom],
        warnings: &mut Vec<DiagnosisWarning>,
    ) -> (Option<SpecialCaseRecord>, Vec<SimilarCase>) {
        if symptoms.is_empty() {
            return (None, Vec::new());
        }

        let prior = self.store.find(symptoms).unwrap_or_else(|e| {
            tracing::warn!("special-case lookup failed: {}", e);
            warnings.push(DiagnosisWarning::persistence("find_special_case", &e));
            None
        });
        let similar = self
            .store
            .find_similar(symptoms, self.cfg.similarity_threshold())
            .unwrap_or_else(|e| {
                tracing::warn!("similar special-case lookup failed: {}", e);
                warnings.push(DiagnosisWarning::persistence("find_similar_special_cases", &e));
                Vec::new()
            });

        (prior, similar)
    }

    fn record_special_case(
        &self,
        case: SpecialCase,
        warnings: &mut Vec<DiagnosisWarning>,
    ) -> Option<SpecialCaseRecord> {
        let mut detail = Map::new();
        detail.insert("key".into(), json!(case.bundle_key()));
        detail.insert("symptoms".into(), json!(case.symptoms));
        detail.insert("patient".into(), json!(case.patient));
        detail.insert("reason".into(), json!(case.reason));

        let record = match self.store.upsert(case) {
            Ok(record) => {
                tracing::info!(
                    key = %record.key,
                    hits = record.hits,
                    "recorded special case"
                );
                Some(record)
            }
            Err(e) => {
                tracing::warn!("failed to record special case: {}", e);
                warnings.push(DiagnosisWarning::persistence("upsert_special_case", &e));
                None
            }
        };

        detail.insert("persisted".into(), json!(record.is_some()));
        self.emit(AUDIT_UPSERT_SPECIAL_CASE_WITH_PATIENT, detail, warnings);
        record
    }

    fn emit(&self, kind: &str, detail: Map<String, Value>, warnings: &mut Vec<DiagnosisWarning>) {
        if let Err(e) = self.audit.emit(AuditEvent::new(kind, detail)) {
            tracing::warn!("failed to emit {} audit event: {}", kind, e);
            warnings.push(DiagnosisWarning::persistence("audit", &e));
        }
    }
}

fn diagnosis_detail(
    patient: &PatientName,
    symptoms: &[Symptom],
    mode: MatchMode,
    qualifying: &[CandidateDisease],
    best: Option<&CandidateDisease>,
) -> Map<String, Value> {
    let mut detail = Map::new();
    detail.insert("patient".into(), json!(patient));
    detail.insert("symptoms".into(), json!(symptoms));
    detail.insert("mode".into(), json!(mode));
    detail.insert(
        "qualifying".into(),
        json!(qualifying.iter().map(|c| &c.disease).collect::<Vec<_>>()),
    );
    if let Some(best) = best {
        detail.insert("disease".into(), json!(best.disease));
        detail.insert("confidence".into(), json!(best.aggregated_score));
    }
    detail
}
