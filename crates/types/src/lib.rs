//! Validated name types shared by the medidx crates.
//!
//! Symptoms, diseases and patients are all identified by free text typed by an operator or read
//! from a knowledge file. These wrappers guarantee the text has been trimmed, that internal runs
//! of whitespace are collapsed to a single space, and that it is non-empty.
//!
//! [`Symptom`] additionally title-cases its input (`"shortness of breath"` becomes
//! `"Shortness Of Breath"`), so that operator input and knowledge-base keys compare equal
//! regardless of how they were typed.

/// Maximum number of characters accepted for any name.
pub const MAX_NAME_LEN: usize = 128;

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded [`MAX_NAME_LEN`] characters
    #[error("Text exceeds maximum length of {MAX_NAME_LEN} characters")]
    TooLong,
    /// The input contained control characters (newlines, tabs excepted as whitespace)
    #[error("Text contains control characters")]
    ControlCharacters,
}

/// Trim, collapse whitespace and apply the length and character checks.
fn clean(input: &str) -> Result<String, TextError> {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(TextError::Empty);
    }
    if collapsed.chars().any(char::is_control) {
        return Err(TextError::ControlCharacters);
    }
    if collapsed.chars().count() > MAX_NAME_LEN {
        return Err(TextError::TooLong);
    }
    Ok(collapsed)
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_is_letter = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

macro_rules! text_impls {
    ($name:ident) => {
        impl $name {
            /// Returns the inner string as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $name::new(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// A reported clinical sign, identified by its normalized name.
///
/// Ordering and equality are on the normalized form, so `"leg  pain"` and `"Leg Pain"` are the
/// same symptom.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symptom(String);

impl Symptom {
    /// Creates a new `Symptom`, trimming, collapsing whitespace and title-casing the input.
    ///
    /// # Errors
    ///
    /// Returns a [`TextError`] if the input is empty after trimming, too long, or contains
    /// control characters.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        clean(input.as_ref()).map(|s| Self(title_case(&s)))
    }
}

text_impls!(Symptom);

/// A diagnosable condition identified by name.
///
/// Disease names keep their casing (`COVID-19`, `Lung Cancer`); only whitespace is normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Disease(String);

impl Disease {
    /// Creates a new `Disease` from the given input.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        clean(input.as_ref()).map(Self)
    }
}

text_impls!(Disease);

/// Name of the patient a diagnosis or special case is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatientName(String);

impl PatientName {
    /// Creates a new `PatientName` from the given input.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        clean(input.as_ref()).map(Self)
    }
}

text_impls!(PatientName);
