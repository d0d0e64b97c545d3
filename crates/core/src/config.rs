//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the diagnosis engine. Nothing here reads process-wide environment variables; the
//! `*_from_env_value` helpers take the raw value so the caller decides where it comes from.

use crate::constants::{
    DEFAULT_BROAD_PRESENTATION_THRESHOLD, DEFAULT_KNOWLEDGE_FILE,
    DEFAULT_LOW_CONFIDENCE_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_SPECIAL_CASE_FILE,
};
use crate::{DiagnosisError, DiagnosisResult};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration resolved at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosisConfig {
    broad_presentation_threshold: usize,
    low_confidence_threshold: f64,
    similarity_threshold: f64,
    all_mode_fallback: bool,
    graph_timeout: Option<Duration>,
}

impl DiagnosisConfig {
    /// Create a new `DiagnosisConfig`.
    ///
    /// # Errors
    ///
    /// Returns `DiagnosisError::InvalidInput` if either fractional threshold lies outside
    /// `[0, 1]` or the graph timeout is zero.
    pub fn new(
        broad_presentation_threshold: usize,
        low_confidence_threshold: f64,
        similarity_threshold: f64,
        all_mode_fallback: bool,
        graph_timeout: Option<Duration>,
    ) -> DiagnosisResult<Self> {
        check_fraction("low_confidence_threshold", low_confidence_threshold)?;
        check_fraction("similarity_threshold", similarity_threshold)?;

        if graph_timeout.is_some_and(|t| t.is_zero()) {
            return Err(DiagnosisError::InvalidInput(
                "graph_timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            broad_presentation_threshold,
            low_confidence_threshold,
            similarity_threshold,
            all_mode_fallback,
            graph_timeout,
        })
    }

    pub fn broad_presentation_threshold(&self) -> usize {
        self.broad_presentation_threshold
    }

    pub fn low_confidence_threshold(&self) -> f64 {
        self.low_confidence_threshold
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn all_mode_fallback(&self) -> bool {
        self.all_mode_fallback
    }

    pub fn graph_timeout(&self) -> Option<Duration> {
        self.graph_timeout
    }
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            broad_presentation_threshold: DEFAULT_BROAD_PRESENTATION_THRESHOLD,
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            all_mode_fallback: false,
            graph_timeout: None,
        }
    }
}

fn check_fraction(field: &str, value: f64) -> DiagnosisResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DiagnosisError::InvalidInput(format!(
            "{field} must be within 0.0-1.0, got {value}"
        )));
    }
    Ok(())
}

/// Trim a raw value and treat blank as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an unsigned count, falling back to `default` when the value is absent or blank.
pub fn usize_from_env_value(
    name: &str,
    value: Option<String>,
    default: usize,
) -> DiagnosisResult<usize> {
    non_blank(value)
        .map(|v| {
            v.parse::<usize>().map_err(|_| {
                DiagnosisError::InvalidInput(format!("{name} must be a whole number, got {v}"))
            })
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

/// Parse a fraction, falling back to `default` when the value is absent or blank.
pub fn fraction_from_env_value(
    name: &str,
    value: Option<String>,
    default: f64,
) -> DiagnosisResult<f64> {
    let parsed = non_blank(value)
        .map(|v| {
            v.parse::<f64>().map_err(|_| {
                DiagnosisError::InvalidInput(format!("{name} must be a number, got {v}"))
            })
        })
        .transpose()?
        .unwrap_or(default);
    check_fraction(name, parsed)?;
    Ok(parsed)
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub fn bool_from_env_value(name: &str, value: Option<String>) -> DiagnosisResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(DiagnosisError::InvalidInput(format!(
            "{name} must be a boolean, got {other}"
        ))),
    }
}

/// Parse a timeout in milliseconds; absent, blank or `0` means no timeout.
pub fn timeout_from_env_value(
    name: &str,
    value: Option<String>,
) -> DiagnosisResult<Option<Duration>> {
    let millis = usize_from_env_value(name, value, 0)?;
    Ok((millis > 0).then(|| Duration::from_millis(millis as u64)))
}

/// Resolve the knowledge file path, defaulting to `knowledge.yaml` in the working directory.
pub fn knowledge_file_from_env_value(value: Option<String>) -> PathBuf {
    non_blank(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_KNOWLEDGE_FILE))
}

/// Resolve the special-case store file, defaulting to `special_cases.json`.
pub fn special_case_file_from_env_value(value: Option<String>) -> PathBuf {
    non_blank(value)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SPECIAL_CASE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_thresholds() {
        let cfg = DiagnosisConfig::default();
        assert_eq!(cfg.broad_presentation_threshold(), 4);
        assert_eq!(cfg.low_confidence_threshold(), 0.15);
        assert_eq!(cfg.similarity_threshold(), 0.5);
        assert!(!cfg.all_mode_fallback());
        assert_eq!(cfg.graph_timeout(), None);
    }

    #[test]
    fn new_rejects_out_of_range_fractions() {
        let err = DiagnosisConfig::new(4, 1.5, 0.5, false, None).unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidInput(_)));

        let err = DiagnosisConfig::new(4, 0.15, -0.1, false, None).unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidInput(_)));
    }

    #[test]
    fn new_rejects_zero_timeout() {
        let err = DiagnosisConfig::new(4, 0.15, 0.5, false, Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, DiagnosisError::InvalidInput(_)));
    }

    #[test]
    fn env_values_fall_back_to_defaults_when_blank() {
        assert_eq!(usize_from_env_value("N", None, 4).unwrap(), 4);
        assert_eq!(usize_from_env_value("N", Some("  ".into()), 4).unwrap(), 4);
        assert_eq!(usize_from_env_value("N", Some(" 6 ".into()), 4).unwrap(), 6);
        assert_eq!(fraction_from_env_value("F", None, 0.15).unwrap(), 0.15);
        assert!(!bool_from_env_value("B", None).unwrap());
        assert_eq!(timeout_from_env_value("T", Some("0".into())).unwrap(), None);
    }

    #[test]
    fn env_values_reject_garbage() {
        assert!(usize_from_env_value("N", Some("four".into()), 4).is_err());
        assert!(fraction_from_env_value("F", Some("2.0".into()), 0.15).is_err());
        assert!(bool_from_env_value("B", Some("maybe".into())).is_err());
    }

    #[test]
    fn env_values_parse_valid_input() {
        assert!(bool_from_env_value("B", Some("Yes".into())).unwrap());
        assert_eq!(
            timeout_from_env_value("T", Some("250".into())).unwrap(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            knowledge_file_from_env_value(None),
            PathBuf::from("knowledge.yaml")
        );
        assert_eq!(
            special_case_file_from_env_value(Some(" ".into())),
            PathBuf::from("special_cases.json")
        );
        assert_eq!(
            special_case_file_from_env_value(Some("/var/lib/medidx/cases.json".into())),
            PathBuf::from("/var/lib/medidx/cases.json")
        );
    }
}
