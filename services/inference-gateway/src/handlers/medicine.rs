//! Medicine recommendation, interaction lookup and safety checks over the
//! `medicine` and `interactions` datasets.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use vdoc_core::artifact::table::Record;
use vdoc_core::{assess, CacheLayer, Complex, KeyArgs, Memoized, MedicineRecord, PatientHistory, ResourceRegistry, SafetyFlag, ServiceError, Table, ToKeyArgs};

use super::{dataset, observe, ranked, unavailable, MemoFn};
use crate::text::tfidf_similarities;

pub const MEDICINES: &str = "medicine";
pub const INTERACTIONS: &str = "interactions";
const TOP_N: usize = 5;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub symptoms: Option<Vec<String>>,
    #[serde(default)]
    pub patient_history: Option<PatientHistory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(flatten)]
    pub medicine: Record,
    pub similarity: f64,
    pub safety_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
    pub symptoms_analyzed: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionsRequest {
    #[serde(default)]
    pub medicines: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub medicine1: String,
    pub medicine2: String,
    pub severity: Value,
    pub description: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionsResponse {
    pub interactions: Vec<Interaction>,
    pub medicines_checked: Vec<String>,
}

/// A full record, or a name resolved against the `medicine` dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MedicineRef {
    Record(MedicineRecord),
    Name(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyRequest {
    #[serde(default)]
    pub medicine: Option<MedicineRef>,
    #[serde(default)]
    pub patient_history: Option<PatientHistory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyResponse {
    pub medicine: MedicineRecord,
    pub safety_score: f64,
    pub recommendations: Vec<SafetyFlag>,
}

/// Memoization input for `recommend`. `table` is the dataset snapshot the answer is
/// computed from and `dataset_version` is its load time, so a reload between keying
/// and computing cannot cache one dataset's answer under another's key.
pub struct RecommendQuery {
    pub symptoms: Vec<String>,
    pub history: PatientHistory,
    pub dataset_version: i64,
    pub table: Arc<Table>,
}

impl ToKeyArgs for RecommendQuery {
    fn key_args(&self) -> KeyArgs {
        KeyArgs::new()
            .arg(&self.symptoms)
            .kwarg("patient_history", Complex(&self.history))
            .kwarg("dataset", self.dataset_version)
    }
}

pub struct MedicineAdvisor {
    registry: Arc<ResourceRegistry>,
    recommend: Memoized<MemoFn<RecommendQuery, RecommendResponse>>,
}

impl MedicineAdvisor {
    pub fn new(registry: Arc<ResourceRegistry>, cache: &Arc<CacheLayer>) -> Self {
        let run: MemoFn<RecommendQuery, RecommendResponse> = Box::new(recommend);
        Self { registry, recommend: cache.memoize("medicine.recommend", None, run) }
    }

    pub fn recommend(&self, req: &RecommendRequest) -> Result<RecommendResponse, ServiceError> {
        observe("medicine.recommend", || {
            let symptoms = req.symptoms.as_ref().filter(|s| !s.is_empty()).ok_or_else(|| ServiceError::missing("Symptoms are required"))?;
            let entry = self.registry.require(MEDICINES)?;
            let table = entry.dataset().cloned().ok_or_else(|| unavailable(&self.registry, MEDICINES))?;
            let query = RecommendQuery {
                symptoms: symptoms.clone(),
                history: req.patient_history.clone().unwrap_or_default(),
                dataset_version: entry.loaded_at.timestamp_micros(),
                table,
            };
            self.recommend.call(&query)
        })
    }

    pub fn check_interactions(&self, req: &InteractionsRequest) -> Result<InteractionsResponse, ServiceError> {
        observe("medicine.check_interactions", || {
            let medicines = req.medicines.as_ref().filter(|m| !m.is_empty()).ok_or_else(|| ServiceError::missing("Medicine list is required"))?;
            let table = dataset(&self.registry, INTERACTIONS)?;
            Ok(InteractionsResponse { interactions: interactions(&table, medicines), medicines_checked: medicines.clone() })
        })
    }

    pub fn check_safety(&self, req: &SafetyRequest) -> Result<SafetyResponse, ServiceError> {
        observe("medicine.check_safety", || {
            let medicine = match &req.medicine {
                None => return Err(ServiceError::missing("Medicine is required")),
                Some(MedicineRef::Name(name)) if name.trim().is_empty() => return Err(ServiceError::missing("Medicine is required")),
                Some(MedicineRef::Name(name)) => self.lookup(name)?,
                Some(MedicineRef::Record(record)) => record.clone(),
            };
            let history = req.patient_history.clone().unwrap_or_default();
            let assessment = assess(&medicine, &history);
            Ok(SafetyResponse { medicine, safety_score: assessment.score, recommendations: assessment.recommendations })
        })
    }

    fn lookup(&self, name: &str) -> Result<MedicineRecord, ServiceError> {
        let table = dataset(&self.registry, MEDICINES)?;
        let row = table
            .rows()
            .iter()
            .find(|r| Table::str_field(r, "name") == Some(name))
            .ok_or_else(|| ServiceError::invalid(format!("unknown medicine '{name}'")))?;
        parse_record(row)
    }
}

fn parse_record(row: &Record) -> Result<MedicineRecord, ServiceError> {
    let record = serde_json::from_value(Value::Object(row.clone())).context("malformed medicine row")?;
    Ok(record)
}

fn recommend(query: &RecommendQuery) -> Result<RecommendResponse, ServiceError> {
    let table = &query.table;
    let descriptions: Vec<&str> = table.rows().iter().map(|r| Table::str_field(r, "description").unwrap_or("")).collect();
    let similarities = tfidf_similarities(&query.symptoms.join(" "), &descriptions);
    let recommendations = ranked(&similarities)
        .into_iter()
        .take(TOP_N)
        .map(|i| {
            let row = &table.rows()[i];
            let safety_score = assess(&parse_record(row)?, &query.history).score;
            Ok(Recommendation { medicine: row.clone(), similarity: similarities[i], safety_score })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;
    Ok(RecommendResponse { recommendations, symptoms_analyzed: query.symptoms.clone() })
}

/// Every ordered pair of distinct medicines with a recorded interaction, in either
/// column order. The first matching row wins.
fn interactions(table: &Table, medicines: &[String]) -> Vec<Interaction> {
    let mut found = Vec::new();
    for a in medicines {
        for b in medicines {
            if a == b { continue; }
            let hit = table.rows().iter().find(|r| {
                let (d1, d2) = (Table::str_field(r, "drug1"), Table::str_field(r, "drug2"));
                (d1 == Some(a.as_str()) && d2 == Some(b.as_str())) || (d1 == Some(b.as_str()) && d2 == Some(a.as_str()))
            });
            if let Some(row) = hit {
                found.push(Interaction {
                    medicine1: a.clone(),
                    medicine2: b.clone(),
                    severity: row.get("severity").cloned().unwrap_or(Value::Null),
                    description: row.get("description").cloned().unwrap_or(Value::Null),
                });
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(v: Value) -> Table { Table::from_records(serde_json::from_value(v).unwrap()) }

    #[test]
    fn interactions_match_either_column_order() {
        let t = table(json!([
            {"drug1": "warfarin", "drug2": "aspirin", "severity": "high", "description": "bleeding risk"},
            {"drug1": "ibuprofen", "drug2": "lisinopril", "severity": "medium", "description": "reduced effect"}
        ]));
        let meds = vec!["aspirin".to_string(), "warfarin".to_string(), "paracetamol".to_string()];
        let found = interactions(&t, &meds);
        assert_eq!(found.len(), 2);
        assert_eq!((found[0].medicine1.as_str(), found[0].medicine2.as_str()), ("aspirin", "warfarin"));
        assert_eq!((found[1].medicine1.as_str(), found[1].medicine2.as_str()), ("warfarin", "aspirin"));
        assert_eq!(found[0].severity, json!("high"));
    }

    #[test]
    fn duplicate_names_are_not_paired() {
        let t = table(json!([{"drug1": "a", "drug2": "a", "severity": "low", "description": "x"}]));
        assert!(interactions(&t, &["a".to_string(), "a".to_string()]).is_empty());
    }

    #[test]
    fn recommend_reads_the_snapshot_it_was_given() {
        let snapshot = table(json!([
            {"name": "Oldprofen", "description": "relieves headache and fever"},
            {"name": "Sleepwell", "description": "helps insomnia"}
        ]));
        let query = RecommendQuery {
            symptoms: vec!["headache".into()],
            history: PatientHistory::default(),
            dataset_version: 1,
            table: Arc::new(snapshot),
        };
        let out = recommend(&query).unwrap();
        assert_eq!(out.recommendations[0].medicine.get("name"), Some(&json!("Oldprofen")));
        assert!(out.recommendations[0].similarity > 0.0);
    }

    #[test]
    fn medicine_ref_accepts_name_or_record() {
        let by_name: SafetyRequest = serde_json::from_value(json!({"medicine": "aspirin"})).unwrap();
        assert_eq!(by_name.medicine, Some(MedicineRef::Name("aspirin".into())));
        let by_record: SafetyRequest = serde_json::from_value(json!({"medicine": {"name": "aspirin", "min_age": 12}})).unwrap();
        assert!(matches!(by_record.medicine, Some(MedicineRef::Record(ref m)) if m.min_age() == 12));
    }
}
