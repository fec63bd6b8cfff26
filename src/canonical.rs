//! Canonical long-format records and the pivots between wide and long.
//!
//! Normalization flattens one wide input row into one record per measure,
//! keyed by period and a composite entity key. The inverse pivot rebuilds a
//! wide table for export, with an explicit policy for colliding cells.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::{debug, info, warn};

use crate::{
    data::Value,
    frame::{Column, Frame, PrimitiveType},
    io_utils,
    schema::{SchemaError, SchemaMap},
};

pub const PERIOD_COLUMN: &str = "period";
pub const ENTITY_COLUMN: &str = "entity";
pub const METRIC_NAME_COLUMN: &str = "metric_name";
pub const METRIC_VALUE_COLUMN: &str = "metric_value";

pub const ENTITY_KEY_SEPARATOR: char = '|';
/// Entity key used when the schema has no entity columns.
pub const OVERALL_ENTITY: &str = "Overall";

/// One observation of one metric for one entity in one period.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub period: String,
    pub entity: String,
    pub metric_name: String,
    pub metric_value: f64,
    /// Raw entity column values, parallel to `CanonicalData::entity_columns`.
    pub entity_values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalData {
    pub entity_columns: Vec<String>,
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalData {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metric names in first-seen order.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for record in &self.records {
            if !names.contains(&record.metric_name) {
                names.push(record.metric_name.clone());
            }
        }
        names
    }

    pub fn distinct_periods(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.period.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn distinct_entities(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.entity.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// How to resolve two canonical records claiming the same pivot cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    #[default]
    FirstWins,
    LastWins,
    Error,
}

/// Composite key for one entity combination, `col:value` pairs joined
/// with `|`. A table without entity columns collapses to [`OVERALL_ENTITY`].
pub fn entity_key(columns: &[String], values: &[String]) -> String {
    if columns.is_empty() {
        return OVERALL_ENTITY.to_string();
    }
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| format!("{column}:{value}"))
        .collect::<Vec<_>>()
        .join(&ENTITY_KEY_SEPARATOR.to_string())
}

/// Flatten a wide frame into canonical records using the schema map roles.
pub fn to_canonical(frame: &Frame, schema: &SchemaMap) -> Result<CanonicalData> {
    let Some(time_column) = schema.time_column.as_deref() else {
        return Err(SchemaError::NoTimeColumn.into());
    };
    if schema.measure_columns.is_empty() {
        return Err(SchemaError::NoMeasureColumns.into());
    }

    let time_idx = resolve_column(frame, time_column)?;
    let entity_indices = schema
        .entity_columns
        .iter()
        .map(|name| resolve_column(frame, name))
        .collect::<Result<Vec<_>>>()?;
    let measure_indices = schema
        .measure_columns
        .iter()
        .map(|name| resolve_column(frame, name))
        .collect::<Result<Vec<_>>>()?;

    let mut records = Vec::new();
    let mut skipped_periods = 0usize;
    let mut skipped_values = 0usize;

    for row in &frame.rows {
        let Some(period_value) = row.get(time_idx).and_then(Option::as_ref) else {
            skipped_periods += 1;
            continue;
        };
        let period = period_value.as_display();

        let entity_values: Vec<String> = entity_indices
            .iter()
            .map(|&idx| {
                row.get(idx)
                    .and_then(Option::as_ref)
                    .map(Value::as_display)
                    .unwrap_or_default()
            })
            .collect();
        let entity = entity_key(&schema.entity_columns, &entity_values);

        for (&idx, name) in measure_indices.iter().zip(&schema.measure_columns) {
            // Every written metric_value must read back as a number.
            let Some(value) = row
                .get(idx)
                .and_then(Option::as_ref)
                .and_then(Value::as_f64)
                .filter(|value| value.is_finite())
            else {
                skipped_values += 1;
                continue;
            };
            records.push(CanonicalRecord {
                period: period.clone(),
                entity: entity.clone(),
                metric_name: name.clone(),
                metric_value: value,
                entity_values: entity_values.clone(),
            });
        }
    }

    if skipped_periods > 0 {
        debug!("Skipped {skipped_periods} rows with a missing period value");
    }
    if skipped_values > 0 {
        debug!("Skipped {skipped_values} missing or non-finite measure cells");
    }

    let data = CanonicalData {
        entity_columns: schema.entity_columns.clone(),
        records,
    };
    info!(
        "Normalized {} records across {} periods, {} entities, {} metrics",
        data.len(),
        data.distinct_periods(),
        data.distinct_entities(),
        data.metric_names().len()
    );
    Ok(data)
}

/// Rebuild a wide frame: one row per (period, entity combination), one
/// column per metric, rows and metric columns sorted.
pub fn from_canonical(data: &CanonicalData, collisions: CollisionPolicy) -> Result<Frame> {
    let mut metric_names: BTreeSet<&str> = BTreeSet::new();
    for record in &data.records {
        metric_names.insert(record.metric_name.as_str());
    }

    let mut grid: BTreeMap<(String, Vec<String>), BTreeMap<&str, f64>> = BTreeMap::new();
    let mut collided = 0usize;
    for record in &data.records {
        let key = (record.period.clone(), record.entity_values.clone());
        let cell = grid.entry(key).or_default();
        match cell.entry(record.metric_name.as_str()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(record.metric_value);
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                collided += 1;
                match collisions {
                    CollisionPolicy::FirstWins => {}
                    CollisionPolicy::LastWins => {
                        slot.insert(record.metric_value);
                    }
                    CollisionPolicy::Error => bail!(
                        "Duplicate canonical value for period '{}', entity '{}', metric '{}'",
                        record.period,
                        entity_key(&data.entity_columns, &record.entity_values),
                        record.metric_name
                    ),
                }
            }
        }
    }

    if collided > 0 {
        let resolution = match collisions {
            CollisionPolicy::FirstWins => "first value kept",
            CollisionPolicy::LastWins => "last value kept",
            // The error policy bails on the first collision.
            CollisionPolicy::Error => unreachable!(),
        };
        warn!("{collided} colliding pivot cells ({resolution})");
    }

    let mut columns = Vec::with_capacity(1 + data.entity_columns.len() + metric_names.len());
    columns.push(Column {
        name: PERIOD_COLUMN.to_string(),
        primitive: PrimitiveType::Text,
    });
    for name in &data.entity_columns {
        columns.push(Column {
            name: name.clone(),
            primitive: PrimitiveType::Text,
        });
    }
    for name in &metric_names {
        columns.push(Column {
            name: (*name).to_string(),
            primitive: PrimitiveType::Float,
        });
    }

    let rows = grid
        .into_iter()
        .map(|((period, entity_values), cells)| {
            let mut row: Vec<Option<Value>> = Vec::with_capacity(columns.len());
            row.push(Some(Value::Text(period)));
            for value in entity_values {
                row.push((!value.is_empty()).then(|| Value::Text(value)));
            }
            for name in &metric_names {
                row.push(cells.get(name).copied().map(Value::Float));
            }
            row
        })
        .collect();

    Ok(Frame::new(columns, rows))
}

pub fn write_canonical(data: &CanonicalData, output: Option<&Path>, delimiter: u8) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(output, delimiter)?;
    let mut header = vec![
        PERIOD_COLUMN.to_string(),
        ENTITY_COLUMN.to_string(),
        METRIC_NAME_COLUMN.to_string(),
        METRIC_VALUE_COLUMN.to_string(),
    ];
    header.extend(data.entity_columns.iter().cloned());
    writer.write_record(&header)?;

    for record in &data.records {
        let mut row = Vec::with_capacity(header.len());
        row.push(record.period.clone());
        row.push(record.entity.clone());
        row.push(record.metric_name.clone());
        row.push(format_metric_value(record.metric_value));
        row.extend(record.entity_values.iter().cloned());
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_canonical(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<CanonicalData> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
    let headers = io_utils::reader_headers(&mut reader, encoding)
        .with_context(|| format!("Reading headers from {path:?}"))?;

    let period_idx = require_column(&headers, PERIOD_COLUMN, path)?;
    let entity_idx = require_column(&headers, ENTITY_COLUMN, path)?;
    let name_idx = require_column(&headers, METRIC_NAME_COLUMN, path)?;
    let value_idx = require_column(&headers, METRIC_VALUE_COLUMN, path)?;

    let reserved = [period_idx, entity_idx, name_idx, value_idx];
    let entity_columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| !reserved.contains(idx))
        .map(|(_, name)| name.clone())
        .collect();
    let entity_indices: Vec<usize> = (0..headers.len())
        .filter(|idx| !reserved.contains(idx))
        .collect();

    let mut records = Vec::new();
    let mut record = csv::ByteRecord::new();
    let mut line = 1usize;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading record from {path:?}"))?
    {
        line += 1;
        let fields = io_utils::decode_record(&record, encoding)?;
        let metric_value: f64 = fields
            .get(value_idx)
            .map(|field| field.trim())
            .unwrap_or("")
            .parse()
            .with_context(|| {
                format!("Parsing metric_value on line {line} of {path:?}")
            })?;
        let field = |idx: usize| fields.get(idx).cloned().unwrap_or_default();
        records.push(CanonicalRecord {
            period: field(period_idx),
            entity: field(entity_idx),
            metric_name: field(name_idx),
            metric_value,
            entity_values: entity_indices.iter().map(|&idx| field(idx)).collect(),
        });
    }

    Ok(CanonicalData {
        entity_columns,
        records,
    })
}

fn resolve_column(frame: &Frame, name: &str) -> Result<usize> {
    frame
        .column_index(name)
        .with_context(|| format!("Column '{name}' from the schema map is not in the input"))
}

fn require_column(headers: &[String], name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .with_context(|| format!("Missing required canonical column '{name}' in {path:?}"))
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use proptest::prelude::*;

    fn text(value: &str) -> Option<Value> {
        Some(Value::Text(value.to_string()))
    }

    fn float(value: f64) -> Option<Value> {
        Some(Value::Float(value))
    }

    fn column(name: &str, primitive: PrimitiveType) -> Column {
        Column {
            name: name.to_string(),
            primitive,
        }
    }

    fn sales_frame() -> Frame {
        Frame::new(
            vec![
                column("month", PrimitiveType::Text),
                column("category", PrimitiveType::Text),
                column("revenue", PrimitiveType::Float),
                column("units", PrimitiveType::Float),
            ],
            vec![
                vec![text("2024-01"), text("A"), float(100.0), float(10.0)],
                vec![text("2024-01"), text("B"), float(200.0), float(20.0)],
                vec![text("2024-02"), text("A"), float(150.0), float(12.0)],
                vec![text("2024-02"), text("B"), float(180.0), float(20.0)],
            ],
        )
    }

    fn sales_canonical() -> CanonicalData {
        let frame = sales_frame();
        to_canonical(&frame, &schema::detect(&frame)).unwrap()
    }

    #[test]
    fn flattens_one_record_per_measure() {
        let data = sales_canonical();
        assert_eq!(data.len(), 8);
        assert_eq!(data.metric_names(), vec!["revenue", "units"]);
        assert_eq!(data.distinct_periods(), 2);
        assert_eq!(data.distinct_entities(), 2);

        let first = &data.records[0];
        assert_eq!(first.period, "2024-01");
        assert_eq!(first.entity, "category:A");
        assert_eq!(first.metric_name, "revenue");
        assert_eq!(first.metric_value, 100.0);
        assert_eq!(first.entity_values, vec!["A"]);
    }

    #[test]
    fn missing_time_column_is_a_schema_error() {
        let frame = sales_frame();
        let map = SchemaMap {
            time_column: None,
            measure_columns: vec!["revenue".to_string()],
            ..SchemaMap::default()
        };
        let err = to_canonical(&frame, &map).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::NoTimeColumn)
        );
    }

    #[test]
    fn missing_measures_are_a_schema_error() {
        let frame = sales_frame();
        let map = SchemaMap {
            time_column: Some("month".to_string()),
            ..SchemaMap::default()
        };
        let err = to_canonical(&frame, &map).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::NoMeasureColumns)
        );
    }

    #[test]
    fn stale_schema_map_columns_are_reported() {
        let frame = sales_frame();
        let map = SchemaMap {
            time_column: Some("month".to_string()),
            measure_columns: vec!["profit".to_string()],
            ..SchemaMap::default()
        };
        let err = to_canonical(&frame, &map).unwrap_err();
        assert!(err.to_string().contains("Column 'profit'"));
    }

    #[test]
    fn missing_measure_cells_are_skipped() {
        let frame = Frame::new(
            vec![
                column("month", PrimitiveType::Text),
                column("revenue", PrimitiveType::Float),
            ],
            vec![
                vec![text("2024-01"), float(10.0)],
                vec![text("2024-02"), None],
            ],
        );
        let data = to_canonical(&frame, &schema::detect(&frame)).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].entity, OVERALL_ENTITY);
    }

    #[test]
    fn non_finite_measure_cells_are_skipped() {
        let frame = Frame::new(
            vec![
                column("month", PrimitiveType::Text),
                column("revenue", PrimitiveType::Float),
            ],
            vec![
                vec![text("2024-01"), float(f64::NAN)],
                vec![text("2024-02"), float(f64::INFINITY)],
                vec![text("2024-03"), float(25.0)],
            ],
        );
        let data = to_canonical(&frame, &schema::detect(&frame)).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].period, "2024-03");
        assert_eq!(data.records[0].metric_value, 25.0);
    }

    #[test]
    fn rows_without_a_period_are_skipped() {
        let frame = Frame::new(
            vec![
                column("month", PrimitiveType::Text),
                column("revenue", PrimitiveType::Float),
            ],
            vec![
                vec![None, float(10.0)],
                vec![text("2024-02"), float(20.0)],
            ],
        );
        let data = to_canonical(&frame, &schema::detect(&frame)).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.records[0].period, "2024-02");
    }

    #[test]
    fn entity_key_joins_column_value_pairs() {
        let columns = vec!["region".to_string(), "product".to_string()];
        let values = vec!["west".to_string(), "gadget".to_string()];
        assert_eq!(entity_key(&columns, &values), "region:west|product:gadget");
        assert_eq!(entity_key(&[], &[]), OVERALL_ENTITY);
    }

    #[test]
    fn pivot_restores_wide_shape() {
        let data = sales_canonical();
        let frame = from_canonical(&data, CollisionPolicy::default()).unwrap();
        assert_eq!(
            frame.column_names(),
            vec!["period", "category", "revenue", "units"]
        );
        assert_eq!(frame.row_count(), 4);
        // Rows sort by (period, entity values).
        assert_eq!(frame.value(0, 0), Some(&Value::Text("2024-01".into())));
        assert_eq!(frame.value(0, 1), Some(&Value::Text("A".into())));
        assert_eq!(frame.value(0, 2), Some(&Value::Float(100.0)));
        assert_eq!(frame.value(3, 2), Some(&Value::Float(180.0)));
    }

    #[test]
    fn pivot_collision_policies_differ() {
        let mut data = sales_canonical();
        let mut duplicate = data.records[0].clone();
        duplicate.metric_value = 999.0;
        data.records.push(duplicate);

        let first = from_canonical(&data, CollisionPolicy::FirstWins).unwrap();
        assert_eq!(first.value(0, 2), Some(&Value::Float(100.0)));

        let last = from_canonical(&data, CollisionPolicy::LastWins).unwrap();
        assert_eq!(last.value(0, 2), Some(&Value::Float(999.0)));

        let err = from_canonical(&data, CollisionPolicy::Error).unwrap_err();
        assert!(err.to_string().contains("Duplicate canonical value"));
        assert!(err.to_string().contains("category:A"));
    }

    #[test]
    fn pivot_leaves_unobserved_cells_empty() {
        let data = CanonicalData {
            entity_columns: vec!["category".to_string()],
            records: vec![
                CanonicalRecord {
                    period: "2024-01".to_string(),
                    entity: "category:A".to_string(),
                    metric_name: "revenue".to_string(),
                    metric_value: 10.0,
                    entity_values: vec!["A".to_string()],
                },
                CanonicalRecord {
                    period: "2024-01".to_string(),
                    entity: "category:B".to_string(),
                    metric_name: "units".to_string(),
                    metric_value: 5.0,
                    entity_values: vec!["B".to_string()],
                },
            ],
        };
        let frame = from_canonical(&data, CollisionPolicy::default()).unwrap();
        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.value(0, 3), None);
        assert_eq!(frame.value(1, 2), None);
    }

    #[test]
    fn canonical_csv_round_trips() {
        let data = sales_canonical();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canonical.csv");
        write_canonical(&data, Some(&path), b',').unwrap();
        let loaded = read_canonical(&path, b',', encoding_rs::UTF_8).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn read_canonical_rejects_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.csv");
        std::fs::write(&path, "month,revenue\n2024-01,10\n").unwrap();
        let err = read_canonical(&path, b',', encoding_rs::UTF_8).unwrap_err();
        assert!(err.to_string().contains("Missing required canonical column"));
    }

    fn entity_value_strategy() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[A-Za-z0-9 _-]{0,8}", 2)
    }

    proptest! {
        #[test]
        fn entity_keys_are_injective_for_separator_free_values(
            left in entity_value_strategy(),
            right in entity_value_strategy()
        ) {
            let columns = vec!["region".to_string(), "product".to_string()];
            let left_key = entity_key(&columns, &left);
            let right_key = entity_key(&columns, &right);
            prop_assert_eq!(left == right, left_key == right_key);
        }
    }
}
