//! Medicine safety scoring.
//!
//! A pure function of a medicine record and a patient history. Rules run in a fixed
//! order (allergy, contraindication, age), each multiplying a running score that
//! starts at 1.0 and emitting one flag per match. Fields absent from the history skip
//! their rule; fields absent from the record impose no restriction.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_MIN_AGE: i64 = 0;
pub const DEFAULT_MAX_AGE: i64 = 100;

const ALLERGY_FACTOR: f64 = 0.0;
const CONTRAINDICATION_FACTOR: f64 = 0.5;
const AGE_FACTOR: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRecord {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub contraindications: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient_age", skip_serializing_if = "Option::is_none")]
    pub min_age: Option<i64>,
    #[serde(default, deserialize_with = "lenient_age", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,
}

impl MedicineRecord {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), contraindications: BTreeSet::new(), min_age: None, max_age: None }
    }

    pub fn min_age(&self) -> i64 { self.min_age.unwrap_or(DEFAULT_MIN_AGE) }
    pub fn max_age(&self) -> i64 { self.max_age.unwrap_or(DEFAULT_MAX_AGE) }
}

/// Tabular datasets store contraindications as one delimited cell.
fn string_or_list<'de, D: Deserializer<'de>>(de: D) -> Result<BTreeSet<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::One(s) => s.split([',', ';', '|']).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
        Raw::Many(v) => v.into_iter().collect(),
        Raw::Null(()) => BTreeSet::new(),
    })
}

/// Ages exported from spreadsheets arrive as `16`, `16.0`, `"16"` or null/empty.
/// Null and empty mean "not set"; fractional values are rejected.
fn lenient_age<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Null(()),
    }
    fn whole<E: serde::de::Error>(f: f64) -> Result<i64, E> {
        if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            Ok(f as i64)
        } else {
            Err(E::custom(format!("age must be a whole number, got {f}")))
        }
    }
    match Raw::deserialize(de)? {
        Raw::Int(i) => Ok(Some(i)),
        Raw::Float(f) => whole(f).map(Some),
        Raw::Text(s) if s.trim().is_empty() => Ok(None),
        Raw::Text(s) => {
            let f: f64 = s.trim().parse().map_err(|_| D::Error::custom(format!("age is not a number: '{s}'")))?;
            whole(f).map(Some)
        }
        Raw::Null(()) => Ok(None),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_age", skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind { Allergy, Contraindication, Age }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity { Medium, High }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyFlag {
    #[serde(rename = "type")]
    pub kind: FlagKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub score: f64,
    pub recommendations: Vec<SafetyFlag>,
}

pub fn assess(medicine: &MedicineRecord, history: &PatientHistory) -> SafetyAssessment {
    let name = &medicine.name;
    let mut score = 1.0_f64;
    let mut flags = Vec::new();

    if let Some(allergies) = &history.allergies {
        if allergies.contains(name) {
            score *= ALLERGY_FACTOR;
            flags.push(SafetyFlag { kind: FlagKind::Allergy, severity: Severity::High, message: format!("Patient is allergic to {name}") });
        }
    }

    if let Some(conditions) = &history.conditions {
        let mut seen = BTreeSet::new();
        for condition in conditions.iter().filter(|c| seen.insert(c.as_str())) {
            if medicine.contraindications.contains(condition) {
                score *= CONTRAINDICATION_FACTOR;
                flags.push(SafetyFlag {
                    kind: FlagKind::Contraindication,
                    severity: Severity::Medium,
                    message: format!("{name} is contraindicated for {condition}"),
                });
            }
        }
    }

    if let Some(age) = history.age {
        let message = if age < medicine.min_age() {
            Some(format!("Patient is too young for {name}"))
        } else if age > medicine.max_age() {
            Some(format!("Patient is too old for {name}"))
        } else {
            None
        };
        if let Some(message) = message {
            score *= AGE_FACTOR;
            flags.push(SafetyFlag { kind: FlagKind::Age, severity: Severity::Medium, message });
        }
    }

    SafetyAssessment { score: round2(score), recommendations: flags }
}

fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }
