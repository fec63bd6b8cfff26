//! Column role detection and the schema map it produces.
//!
//! This module owns the [`SchemaMap`] struct (which column plays which role
//! in the analysis), the ranked rule table that finds the time column, and
//! the cardinality heuristics that separate entities, measures, and
//! free-form text. Detection never fails: a table with no usable time or
//! measure columns still yields a map, and normalization reports the
//! missing role as a [`SchemaError`].

use std::{fmt, fs, path::Path, sync::LazyLock};

use anyhow::{Context, Result};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    data::{Value, parses_as_temporal},
    frame::{Frame, PrimitiveType},
};

/// Name fragments that mark a column as temporal.
pub const TIME_KEYWORDS: &[&str] = &[
    "date", "month", "year", "period", "time", "quarter", "week", "day",
];

/// Name fragments that mark a column as an entity dimension.
pub const ENTITY_KEYWORDS: &[&str] = &[
    "category", "product", "department", "account", "region", "segment", "group", "type", "class",
    "id", "name", "code",
];

/// Text columns below this distinct ratio behave as categorical dimensions.
const ENTITY_DISTINCT_RATIO_MAX: f64 = 0.2;
/// Integer columns above this distinct ratio are identifiers, not measures.
const IDENTIFIER_DISTINCT_RATIO_MIN: f64 = 0.8;
/// Text columns above this distinct ratio carry free-form annotations.
const TEXT_DISTINCT_RATIO_MIN: f64 = 0.5;
/// Rows probed when testing whether a text column parses as dates.
const TIME_PROBE_ROWS: usize = 10;

// Tiers are ranked, not additive. Per column, the first matching rule
// assigns the tier; across columns the highest tier wins and ties go to
// the leftmost column.
const TIER_NAME_KEYWORD: u8 = 6;
const TIER_TYPED_TEMPORAL: u8 = 5;
const TIER_PERIOD_PATTERN: u8 = 5;
const TIER_PARSEABLE_HEAD: u8 = 4;

type TimeRule = fn(&Frame, usize) -> bool;

const TIME_RULES: &[(&str, TimeRule, u8)] = &[
    ("name keyword", name_has_time_keyword, TIER_NAME_KEYWORD),
    ("typed temporal", column_is_temporal, TIER_TYPED_TEMPORAL),
    ("parseable head", head_parses_as_temporal, TIER_PARSEABLE_HEAD),
    ("period pattern", leads_with_period_pattern, TIER_PERIOD_PATTERN),
];

static PERIOD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}").expect("period pattern regex"));

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    #[error("No time column detected: normalization requires a date or period column")]
    NoTimeColumn,
    #[error("No measure columns detected: analysis requires at least one numeric column")]
    NoMeasureColumns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Time,
    Entity,
    Measure,
    Text,
    Excluded,
}

impl ColumnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnRole::Time => "time",
            ColumnRole::Entity => "entity",
            ColumnRole::Measure => "measure",
            ColumnRole::Text => "text",
            ColumnRole::Excluded => "excluded",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assignment of every input column to exactly one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMap {
    pub time_column: Option<String>,
    #[serde(default)]
    pub entity_columns: Vec<String>,
    #[serde(default)]
    pub measure_columns: Vec<String>,
    #[serde(default)]
    pub text_columns: Vec<String>,
    #[serde(default)]
    pub excluded_columns: Vec<String>,
}

impl SchemaMap {
    pub fn role_of(&self, name: &str) -> ColumnRole {
        if self.time_column.as_deref() == Some(name) {
            ColumnRole::Time
        } else if self.entity_columns.iter().any(|column| column == name) {
            ColumnRole::Entity
        } else if self.measure_columns.iter().any(|column| column == name) {
            ColumnRole::Measure
        } else if self.text_columns.iter().any(|column| column == name) {
            ColumnRole::Text
        } else {
            ColumnRole::Excluded
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut rendered = serde_json::to_string_pretty(self)
            .context("Serializing schema map to JSON")?;
        rendered.push('\n');
        fs::write(path, rendered).with_context(|| format!("Writing schema map {path:?}"))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Reading schema map {path:?}"))?;
        let map: SchemaMap = serde_json::from_str(&contents)
            .with_context(|| format!("Parsing schema map {path:?}"))?;
        Ok(map)
    }
}

/// Assign a role to every column of the frame.
pub fn detect(frame: &Frame) -> SchemaMap {
    let mut map = SchemaMap {
        time_column: detect_time_column(frame),
        ..SchemaMap::default()
    };

    for (idx, column) in frame.columns.iter().enumerate() {
        if map.time_column.as_deref() == Some(column.name.as_str()) {
            continue;
        }
        if is_entity_column(frame, idx) {
            map.entity_columns.push(column.name.clone());
        }
    }

    for (idx, column) in frame.columns.iter().enumerate() {
        if map.role_of(&column.name) != ColumnRole::Excluded {
            continue;
        }
        if is_measure_column(frame, idx) {
            map.measure_columns.push(column.name.clone());
        }
    }

    for (idx, column) in frame.columns.iter().enumerate() {
        if map.role_of(&column.name) != ColumnRole::Excluded {
            continue;
        }
        if is_text_column(frame, idx) {
            map.text_columns.push(column.name.clone());
        }
    }

    for column in &frame.columns {
        if map.role_of(&column.name) == ColumnRole::Excluded {
            map.excluded_columns.push(column.name.clone());
        }
    }

    info!(
        "Detected schema: time={}, {} entity, {} measure, {} text, {} excluded",
        map.time_column.as_deref().unwrap_or("(none)"),
        map.entity_columns.len(),
        map.measure_columns.len(),
        map.text_columns.len(),
        map.excluded_columns.len()
    );
    map
}

fn detect_time_column(frame: &Frame) -> Option<String> {
    let mut best: Option<(u8, usize)> = None;
    for idx in 0..frame.column_count() {
        let Some((label, tier)) = time_candidate(frame, idx) else {
            continue;
        };
        debug!(
            "Time candidate '{}' via {label} rule (tier {tier})",
            frame.columns[idx].name
        );
        if best.is_none_or(|(best_tier, _)| tier > best_tier) {
            best = Some((tier, idx));
        }
    }
    best.map(|(_, idx)| frame.columns[idx].name.clone())
}

fn time_candidate(frame: &Frame, idx: usize) -> Option<(&'static str, u8)> {
    TIME_RULES
        .iter()
        .find(|(_, rule, _)| rule(frame, idx))
        .map(|(label, _, tier)| (*label, *tier))
}

fn name_has_time_keyword(frame: &Frame, idx: usize) -> bool {
    let lowered = frame.columns[idx].name.to_lowercase();
    TIME_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

fn column_is_temporal(frame: &Frame, idx: usize) -> bool {
    frame.columns[idx].primitive.is_temporal()
}

fn head_parses_as_temporal(frame: &Frame, idx: usize) -> bool {
    if frame.columns[idx].primitive != PrimitiveType::Text {
        return false;
    }
    let mut probed = 0usize;
    for row in frame.rows.iter().take(TIME_PROBE_ROWS) {
        let Some(Some(Value::Text(cell))) = row.get(idx) else {
            continue;
        };
        if !parses_as_temporal(cell) {
            return false;
        }
        probed += 1;
    }
    probed > 0
}

fn leads_with_period_pattern(frame: &Frame, idx: usize) -> bool {
    if frame.columns[idx].primitive != PrimitiveType::Text {
        return false;
    }
    match frame.rows.first().and_then(|row| row.get(idx)) {
        Some(Some(Value::Text(first))) => PERIOD_PATTERN.is_match(first),
        _ => false,
    }
}

fn is_entity_column(frame: &Frame, idx: usize) -> bool {
    let lowered = frame.columns[idx].name.to_lowercase();
    if ENTITY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        return true;
    }
    frame.columns[idx].primitive == PrimitiveType::Text
        && frame.distinct_ratio(idx) < ENTITY_DISTINCT_RATIO_MAX
        && frame.distinct_count(idx) > 1
}

fn is_measure_column(frame: &Frame, idx: usize) -> bool {
    let column = &frame.columns[idx];
    if !column.primitive.is_numeric() {
        return false;
    }
    // Integer columns where nearly every value differs are identifiers.
    !(column.primitive == PrimitiveType::Integer
        && frame.distinct_ratio(idx) > IDENTIFIER_DISTINCT_RATIO_MIN)
}

fn is_text_column(frame: &Frame, idx: usize) -> bool {
    frame.columns[idx].primitive == PrimitiveType::Text
        && frame.distinct_ratio(idx) > TEXT_DISTINCT_RATIO_MIN
}
