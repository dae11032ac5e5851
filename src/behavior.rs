//! Behavioural log reader.
//!
//! The experiment software writes one delimited row per trial, in
//! presentation order.  Only two things are needed from it: the columns the
//! paradigm's condition rules test, and the response latency in
//! milliseconds.
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::PipelineError;

/// Column holding response latency in milliseconds.
pub const DEFAULT_RESPONSE_COLUMN: &str = "response_time";

#[derive(Debug, Clone, PartialEq)]
pub struct BehavioralLog {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl BehavioralLog {
    /// Build from a header and rows; every row must have one field per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> crate::error::Result<Self> {
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(PipelineError::Malformed {
                what: "behavioural log".into(),
                reason: format!("row {i} has {} fields, header has {}", r.len(), columns.len()),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("open behavioural log {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::new(columns, rows)?)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> crate::error::Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::MissingColumn { column: name.to_string() })
    }

    /// Field `col` of trial `row`.
    pub fn field(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    /// Per-trial response latency converted to whole samples.
    ///
    /// `trunc(ms / 1000 × sfreq)`; an empty or `NaN` cell means no response.
    pub fn reaction_time_samples(&self, column: &str, sfreq: f64) -> crate::error::Result<Vec<Option<i64>>> {
        let col = self.column_index(column)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let cell = r[col].trim();
                if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("na") {
                    return Ok(None);
                }
                let ms: f64 = cell.parse().map_err(|_| PipelineError::Malformed {
                    what: format!("column '{column}'"),
                    reason: format!("trial {i}: '{cell}' is not a number"),
                })?;
                Ok(Some((ms / 1000.0 * sfreq) as i64))
            })
            .collect()
    }
}
