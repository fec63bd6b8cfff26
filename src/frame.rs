//! In-memory typed table and the type inference that builds it from CSV.
//!
//! A [`Frame`] holds every row of the input file with cells parsed to
//! [`Value`]s, so role detection can inspect cardinality over the full
//! dataset rather than a sample. Inference is unanimous: a single
//! non-missing cell that fails to parse as the candidate type demotes the
//! whole column to text.

use std::{collections::HashSet, fmt, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use encoding_rs::Encoding;
use log::debug;

use crate::{
    data::{Value, is_missing_token, parse_naive_date, parse_naive_datetime},
    io_utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Integer,
    Float,
    Date,
    DateTime,
    Text,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::Integer => "integer",
            PrimitiveType::Float => "float",
            PrimitiveType::Date => "date",
            PrimitiveType::DateTime => "datetime",
            PrimitiveType::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, PrimitiveType::Integer | PrimitiveType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, PrimitiveType::Date | PrimitiveType::DateTime)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub primitive: PrimitiveType,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl Frame {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Option<Value>>>) -> Self {
        Self { columns, rows }
    }

    pub fn read_csv(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;

        let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
        let mut record = csv::ByteRecord::new();
        while reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading record from {path:?}"))?
        {
            let fields = io_utils::decode_record(&record, encoding)?;
            let mut row = Vec::with_capacity(headers.len());
            for idx in 0..headers.len() {
                let raw = fields.get(idx).map(|field| field.trim()).unwrap_or("");
                if is_missing_token(raw) {
                    row.push(None);
                } else {
                    row.push(Some(raw.to_string()));
                }
            }
            raw_rows.push(row);
        }

        let mut candidates: Vec<TypeCandidate> =
            headers.iter().map(|_| TypeCandidate::default()).collect();
        for row in &raw_rows {
            for (candidate, cell) in candidates.iter_mut().zip(row) {
                if let Some(raw) = cell {
                    candidate.update(raw);
                }
            }
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .zip(&candidates)
            .map(|(name, candidate)| {
                let primitive = candidate.decide();
                debug!("Column '{name}' inferred as {primitive}");
                Column { name, primitive }
            })
            .collect();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&columns)
                    .map(|(cell, column)| cell.and_then(|raw| parse_cell(&raw, column.primitive)))
                    .collect()
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn write_csv(&self, output: Option<&Path>, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(output, delimiter)?;
        writer.write_record(self.columns.iter().map(|column| column.name.as_str()))?;
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                .collect();
            writer.write_record(&cells)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|cells| cells.get(column)).and_then(Option::as_ref)
    }

    /// Number of distinct non-missing values in a column.
    pub fn distinct_count(&self, column: usize) -> usize {
        let mut seen = HashSet::new();
        for row in &self.rows {
            if let Some(Some(value)) = row.get(column) {
                seen.insert(value.as_display());
            }
        }
        seen.len()
    }

    /// Distinct non-missing values divided by total row count.
    /// An empty frame yields 0.0.
    pub fn distinct_ratio(&self, column: usize) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.distinct_count(column) as f64 / self.rows.len() as f64
    }

    /// The first non-missing value in a column, rendered for display.
    pub fn sample_value(&self, column: usize) -> Option<String> {
        self.rows
            .iter()
            .find_map(|row| row.get(column).and_then(Option::as_ref))
            .map(Value::as_display)
    }
}

fn parse_cell(raw: &str, primitive: PrimitiveType) -> Option<Value> {
    match primitive {
        PrimitiveType::Integer => raw.parse::<i64>().ok().map(Value::Integer),
        PrimitiveType::Float => raw.parse::<f64>().ok().map(Value::Float),
        PrimitiveType::Date => parse_naive_date(raw).ok().map(Value::Date),
        PrimitiveType::DateTime => parse_naive_datetime(raw)
            .ok()
            .map(Value::DateTime)
            .or_else(|| {
                // Date-only cells in a mixed column coerce to midnight.
                parse_naive_date(raw)
                    .ok()
                    .map(|date| Value::DateTime(date.and_time(NaiveTime::MIN)))
            }),
        PrimitiveType::Text => Some(Value::Text(raw.to_string())),
    }
}

#[derive(Debug, Default)]
struct TypeCandidate {
    non_missing: usize,
    integer_matches: usize,
    float_matches: usize,
    date_matches: usize,
    datetime_matches: usize,
}

impl TypeCandidate {
    fn update(&mut self, value: &str) {
        self.non_missing += 1;

        if value.parse::<i64>().is_ok() {
            self.integer_matches += 1;
            self.float_matches += 1;
            return;
        }
        if value.parse::<f64>().is_ok() {
            self.float_matches += 1;
            return;
        }
        if parse_naive_date(value).is_ok() {
            self.date_matches += 1;
            return;
        }
        if parse_naive_datetime(value).is_ok() {
            self.datetime_matches += 1;
        }
    }

    fn unanimous(&self, count: usize) -> bool {
        count > 0 && count == self.non_missing
    }

    fn decide(&self) -> PrimitiveType {
        if self.unanimous(self.integer_matches) {
            PrimitiveType::Integer
        } else if self.unanimous(self.float_matches) {
            PrimitiveType::Float
        } else if self.unanimous(self.date_matches) {
            PrimitiveType::Date
        } else if self.unanimous(self.date_matches + self.datetime_matches)
            && self.datetime_matches > 0
        {
            PrimitiveType::DateTime
        } else {
            PrimitiveType::Text
        }
    }
}
