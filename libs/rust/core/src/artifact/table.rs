//! Tabular datasets: an ordered list of JSON records.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::{extension, LoadError};

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub rows: usize,
    pub columns: Vec<String>,
    pub missing_values: BTreeMap<String, usize>,
    pub unique_values: BTreeMap<String, usize>,
}

impl Table {
    /// Columns are the union of record keys in first-seen order.
    pub fn from_records(rows: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.clone()) { columns.push(key.clone()); }
            }
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] { &self.columns }
    pub fn rows(&self) -> &[Record] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn str_field<'a>(row: &'a Record, column: &str) -> Option<&'a str> { row.get(column).and_then(Value::as_str) }

    pub fn deserialize_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.rows.iter().map(|r| serde_json::from_value(Value::Object(r.clone()))).collect()
    }

    /// Shape, per-column missing (absent or null) counts and distinct non-null counts.
    pub fn info(&self) -> TableInfo {
        let mut missing_values = BTreeMap::new();
        let mut unique_values = BTreeMap::new();
        for col in &self.columns {
            let mut missing = 0;
            let mut distinct = HashSet::new();
            for row in &self.rows {
                match row.get(col) {
                    None | Some(Value::Null) => missing += 1,
                    Some(v) => { distinct.insert(v.to_string()); }
                }
            }
            missing_values.insert(col.clone(), missing);
            unique_values.insert(col.clone(), distinct.len());
        }
        TableInfo { rows: self.rows.len(), columns: self.columns.clone(), missing_values, unique_values }
    }
}

pub fn load_table(path: &Path) -> Result<Table, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
    let rows: Vec<Record> = match extension(path).as_str() {
        "json" => serde_json::from_slice(&bytes).map_err(|e| LoadError::malformed(path, e))?,
        "yaml" | "yml" => serde_yaml::from_slice(&bytes).map_err(|e| LoadError::malformed(path, e))?,
        _ => return Err(LoadError::Unsupported(path.to_path_buf())),
    };
    Ok(Table::from_records(rows))
}

pub(crate) fn encode_table(path: &Path, table: &Table) -> Result<Vec<u8>, LoadError> {
    match extension(path).as_str() {
        "json" => serde_json::to_vec_pretty(table.rows()).map_err(|e| LoadError::malformed(path, e)),
        "yaml" | "yml" => serde_yaml::to_string(table.rows()).map(String::into_bytes).map_err(|e| LoadError::malformed(path, e)),
        _ => Err(LoadError::Unsupported(path.to_path_buf())),
    }
}
