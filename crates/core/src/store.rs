//! Special-case persistence.
//!
//! The engine hands every detected [`SpecialCase`] to a [`SpecialCaseStore`] and keeps nothing
//! itself. Stores aggregate cases by symptom bundle: recording the same bundle again bumps its
//! hit count and adds the patient, so repeated unexplained presentations become visible.
//!
//! [`InMemorySpecialCaseStore`] lives as long as the process. [`JsonFileSpecialCaseStore`] keeps
//! the records in a JSON file so a one-shot CLI run sees the bundles recorded by earlier runs.

use crate::error::{PersistenceError, PersistenceResult};
use crate::special_case::{bundle_key, SpecialCase};
use chrono::{DateTime, Utc};
use medidx_types::{PatientName, Symptom};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type Records = BTreeMap<String, SpecialCaseRecord>;

/// Stored state of one symptom bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialCaseRecord {
    pub key: String,
    pub symptoms: Vec<Symptom>,
    /// Patients seen with this bundle, in first-seen order.
    pub patients: Vec<PatientName>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub hits: u64,
    /// Reason given the last time the bundle was recorded.
    pub reason: String,
}

/// A stored case sharing symptoms with the current presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarCase {
    pub record: SpecialCaseRecord,
    pub matched_symptoms: Vec<Symptom>,
}

/// Persistence for special cases.
///
/// Every method may fail; callers treat failures as warnings, never as diagnosis errors.
pub trait SpecialCaseStore: Send + Sync {
    /// Creates or updates the record for the case's symptom bundle.
    fn upsert(&self, case: SpecialCase) -> PersistenceResult<SpecialCaseRecord>;

    /// Looks up the record for exactly this symptom bundle.
    fn find(&self, symptoms: &[Symptom]) -> PersistenceResult<Option<SpecialCaseRecord>>;

    /// Records sharing at least `max(1, floor(n * similarity_threshold))` of the `n` distinct
    /// input symptoms, most overlapping first.
    fn find_similar(
        &self,
        symptoms: &[Symptom],
        similarity_threshold: f64,
    ) -> PersistenceResult<Vec<SimilarCase>>;
}

/// Minimum overlap for a stored case to count as similar.
pub fn min_similar_matches(distinct_symptoms: usize, similarity_threshold: f64) -> usize {
    ((distinct_symptoms as f64 * similarity_threshold).floor() as usize).max(1)
}

fn upsert_record(records: &mut Records, case: SpecialCase) -> SpecialCaseRecord {
    let key = case.bundle_key();
    records
        .entry(key.clone())
        .and_modify(|r| {
            r.hits += 1;
            r.last_seen = case.timestamp;
            r.reason = case.reason.clone();
            if !r.patients.contains(&case.patient) {
                r.patients.push(case.patient.clone());
            }
        })
        .or_insert_with(|| SpecialCaseRecord {
            key,
            symptoms: case.symptoms.clone(),
            patients: vec![case.patient.clone()],
            first_seen: case.timestamp,
            last_seen: case.timestamp,
            hits: 1,
            reason: case.reason.clone(),
        })
        .clone()
}

fn similar_records(
    records: &Records,
    symptoms: &[Symptom],
    similarity_threshold: f64,
) -> Vec<SimilarCase> {
    let wanted: BTreeSet<&Symptom> = symptoms.iter().collect();
    if wanted.is_empty() {
        return Vec::new();
    }
    let needed = min_similar_matches(wanted.len(), similarity_threshold);

    let mut similar: Vec<SimilarCase> = records
        .values()
        .filter_map(|record| {
            let matched: Vec<Symptom> = record
                .symptoms
                .iter()
                .filter(|s| wanted.contains(s))
                .cloned()
                .collect();
            (matched.len() >= needed).then(|| SimilarCase {
                record: record.clone(),
                matched_symptoms: matched,
            })
        })
        .collect();

    // records iterate in key order, and the sort is stable
    similar.sort_by(|a, b| b.matched_symptoms.len().cmp(&a.matched_symptoms.len()));
    similar
}

/// Process-local [`SpecialCaseStore`].
#[derive(Debug, Default)]
pub struct InMemorySpecialCaseStore {
    records: Mutex<Records>,
}

impl InMemorySpecialCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Records>> {
        self.records
            .lock()
            .map_err(|_| PersistenceError("special-case store lock poisoned".into()))
    }

    /// Snapshot of every stored record, ordered by bundle key.
    pub fn records(&self) -> PersistenceResult<Vec<SpecialCaseRecord>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

impl SpecialCaseStore for InMemorySpecialCaseStore {
    fn upsert(&self, case: SpecialCase) -> PersistenceResult<SpecialCaseRecord> {
        Ok(upsert_record(&mut *self.lock()?, case))
    }

    fn find(&self, symptoms: &[Symptom]) -> PersistenceResult<Option<SpecialCaseRecord>> {
        Ok(self.lock()?.get(&bundle_key(symptoms)).cloned())
    }

    fn find_similar(
        &self,
        symptoms: &[Symptom],
        similarity_threshold: f64,
    ) -> PersistenceResult<Vec<SimilarCase>> {
        Ok(similar_records(&*self.lock()?, symptoms, similarity_threshold))
    }
}

/// [`SpecialCaseStore`] backed by a JSON file holding an array of records.
///
/// A missing file is an empty store. Writes go to a sibling temporary file that is then renamed
/// over the original, so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct JsonFileSpecialCaseStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileSpecialCaseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|_| PersistenceError("special-case file lock poisoned".into()))
    }

    fn read(&self) -> PersistenceResult<Records> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(e) => {
                return Err(PersistenceError(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        if text.trim().is_empty() {
            return Ok(Records::new());
        }

        let records: Vec<SpecialCaseRecord> = serde_json::from_str(&text).map_err(|e| {
            PersistenceError(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(records.into_iter().map(|r| (r.key.clone(), r)).collect())
    }

    fn write(&self, records: &Records) -> PersistenceResult<()> {
        let io_error = |e: std::io::Error| {
            PersistenceError(format!("failed to write {}: {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let values: Vec<&SpecialCaseRecord> = records.values().collect();
        let json = serde_json::to_string_pretty(&values)
            .map_err(|e| PersistenceError(format!("failed to serialize special cases: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

impl SpecialCaseStore for JsonFileSpecialCaseStore {
    fn upsert(&self, case: SpecialCase) -> PersistenceResult<SpecialCaseRecord> {
        let _guard = self.lock()?;
        let mut records = self.read()?;
        let record = upsert_record(&mut records, case);
        self.write(&records)?;
        Ok(record)
    }

    fn find(&self, symptoms: &[Symptom]) -> PersistenceResult<Option<SpecialCaseRecord>> {
        let _guard = self.lock()?;
        Ok(self.read()?.remove(&bundle_key(symptoms)))
    }

    fn find_similar(
        &self,
        symptoms: &[Symptom],
        similarity_threshold: f64,
    ) -> PersistenceResult<Vec<SimilarCase>> {
        let _guard = self.lock()?;
        Ok(similar_records(&self.read()?, symptoms, similarity_threshold))
    }
}
