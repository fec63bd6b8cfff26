//! Period-over-period variance and price/volume decomposition.
//!
//! Records are emitted metric by metric in first-seen order, then by
//! adjacent period pair, then by entity in sorted order, so output is
//! stable for a given canonical input. Periods compare lexicographically,
//! which is adequate for ISO-style date and month strings.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    canonical::CanonicalData,
    io_utils,
    registry::{DriverCategory, MetricRegistry},
};

pub const VARIANCE_COLUMNS: &[&str] = &[
    "entity",
    "metric_name",
    "current_period",
    "prior_period",
    "current_value",
    "prior_value",
    "delta_absolute",
    "delta_percentage",
    "price_effect",
    "volume_effect",
    "interaction_effect",
];

pub const TOP_MOVER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct VarianceRecord {
    pub entity: String,
    pub metric_name: String,
    pub current_period: String,
    pub prior_period: String,
    pub current_value: f64,
    pub prior_value: f64,
    pub delta_absolute: f64,
    /// NaN when the prior value is zero; never infinity.
    pub delta_percentage: f64,
    pub price_effect: Option<f64>,
    pub volume_effect: Option<f64>,
    pub interaction_effect: Option<f64>,
}

/// How decomposable metrics are paired with price/volume proxies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyPairing {
    /// First registered price metric and first registered volume metric
    /// serve as a single global proxy pair.
    #[default]
    FirstListed,
    Disabled,
}

/// Base variance plus decomposition in one pass.
pub fn compute_variance(
    data: &CanonicalData,
    registry: &MetricRegistry,
    pairing: ProxyPairing,
) -> Vec<VarianceRecord> {
    let mut records = period_over_period(data);
    decompose(&mut records, registry, pairing);
    records
}

/// Compare every (entity, metric) series across adjacent periods.
/// Entities missing from either side of a pair are skipped, and duplicate
/// canonical observations resolve to the first value seen.
pub fn period_over_period(data: &CanonicalData) -> Vec<VarianceRecord> {
    let mut metric_order: Vec<&str> = Vec::new();
    let mut grids: HashMap<&str, BTreeMap<&str, BTreeMap<&str, f64>>> = HashMap::new();
    for record in &data.records {
        if !grids.contains_key(record.metric_name.as_str()) {
            metric_order.push(record.metric_name.as_str());
        }
        grids
            .entry(record.metric_name.as_str())
            .or_default()
            .entry(record.entity.as_str())
            .or_default()
            .entry(record.period.as_str())
            .or_insert(record.metric_value);
    }

    let mut out = Vec::new();
    for metric in metric_order {
        let Some(entities) = grids.get(metric) else {
            continue;
        };
        let periods: BTreeSet<&str> = entities
            .values()
            .flat_map(|series| series.keys().copied())
            .collect();
        for (prior_period, current_period) in periods.iter().tuple_windows() {
            for (entity, series) in entities {
                let (Some(&prior_value), Some(&current_value)) =
                    (series.get(*prior_period), series.get(*current_period))
                else {
                    continue;
                };
                if prior_value.is_nan() || current_value.is_nan() {
                    continue;
                }
                let delta_absolute = current_value - prior_value;
                let delta_percentage = if prior_value == 0.0 {
                    f64::NAN
                } else {
                    delta_absolute / prior_value * 100.0
                };
                out.push(VarianceRecord {
                    entity: (*entity).to_string(),
                    metric_name: metric.to_string(),
                    current_period: (*current_period).to_string(),
                    prior_period: (*prior_period).to_string(),
                    current_value,
                    prior_value,
                    delta_absolute,
                    delta_percentage,
                    price_effect: None,
                    volume_effect: None,
                    interaction_effect: None,
                });
            }
        }
    }
    debug!("Computed {} variance records", out.len());
    out
}

/// Fill the effect fields of decomposable metrics from the proxy pair.
/// Returns the number of records decomposed.
pub fn decompose(
    records: &mut [VarianceRecord],
    registry: &MetricRegistry,
    pairing: ProxyPairing,
) -> usize {
    if pairing == ProxyPairing::Disabled {
        debug!("Price/volume decomposition disabled");
        return 0;
    }
    let decomposable: Vec<&str> = registry
        .decomposable()
        .map(|metric| metric.name.as_str())
        .collect();
    if decomposable.is_empty() {
        debug!("No decomposable metrics registered");
        return 0;
    }
    let Some(price_proxy) = registry.first_with_driver(DriverCategory::Price) else {
        warn!("Decomposable metrics present but no price proxy registered; skipping decomposition");
        return 0;
    };
    let Some(volume_proxy) = registry.first_with_driver(DriverCategory::Volume) else {
        warn!("Decomposable metrics present but no volume proxy registered; skipping decomposition");
        return 0;
    };
    if decomposable.len() > 1 {
        warn!(
            "Proxy pair '{}'/'{}' is shared by {} decomposable metrics",
            price_proxy.name,
            volume_proxy.name,
            decomposable.len()
        );
    }
    info!(
        "Decomposing with price proxy '{}' and volume proxy '{}'",
        price_proxy.name, volume_proxy.name
    );

    let price_series = proxy_series(records, &price_proxy.name);
    let volume_series = proxy_series(records, &volume_proxy.name);

    let mut applied = 0usize;
    for record in records.iter_mut() {
        if !decomposable.contains(&record.metric_name.as_str()) {
            continue;
        }
        let key = (
            record.entity.clone(),
            record.current_period.clone(),
            record.prior_period.clone(),
        );
        let (Some(&(price_prior, price_current)), Some(&(volume_prior, volume_current))) =
            (price_series.get(&key), volume_series.get(&key))
        else {
            continue;
        };
        let price_delta = price_current - price_prior;
        let volume_delta = volume_current - volume_prior;
        record.price_effect = Some(price_delta * volume_prior);
        record.volume_effect = Some(volume_delta * price_prior);
        record.interaction_effect = Some(price_delta * volume_delta);
        applied += 1;
    }
    info!("Applied decomposition to {applied} records");
    applied
}

fn proxy_series(
    records: &[VarianceRecord],
    metric: &str,
) -> HashMap<(String, String, String), (f64, f64)> {
    records
        .iter()
        .filter(|record| record.metric_name == metric)
        .map(|record| {
            (
                (
                    record.entity.clone(),
                    record.current_period.clone(),
                    record.prior_period.clone(),
                ),
                (record.prior_value, record.current_value),
            )
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TopMover {
    pub entity: String,
    pub metric_name: String,
    pub delta_absolute: f64,
    pub delta_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VarianceSummary {
    pub latest_period: String,
    pub total_variance_records: usize,
    pub entities_analyzed: usize,
    pub metrics_analyzed: usize,
    pub top_movers: Vec<TopMover>,
}

impl VarianceSummary {
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut rendered = serde_json::to_string_pretty(self)
            .context("Serializing variance summary to JSON")?;
        rendered.push('\n');
        fs::write(path, rendered)
            .with_context(|| format!("Writing variance summary {path:?}"))?;
        Ok(())
    }
}

/// Summary of the latest period's movement, keeping at most `top`
/// movers (0 keeps all). `None` when there are no variance records to
/// summarize.
pub fn summarize(records: &[VarianceRecord], top: usize) -> Option<VarianceSummary> {
    let latest_period = records
        .iter()
        .map(|record| record.current_period.as_str())
        .max()?
        .to_string();

    let mut movers: Vec<&VarianceRecord> = records
        .iter()
        .filter(|record| record.current_period == latest_period)
        .collect();
    movers.sort_by(|a, b| b.delta_absolute.total_cmp(&a.delta_absolute));
    if top > 0 {
        movers.truncate(top);
    }

    let entities: HashSet<&str> = records.iter().map(|record| record.entity.as_str()).collect();
    let metrics: HashSet<&str> = records
        .iter()
        .map(|record| record.metric_name.as_str())
        .collect();

    Some(VarianceSummary {
        latest_period,
        total_variance_records: records.len(),
        entities_analyzed: entities.len(),
        metrics_analyzed: metrics.len(),
        top_movers: movers
            .into_iter()
            .map(|record| TopMover {
                entity: record.entity.clone(),
                metric_name: record.metric_name.clone(),
                delta_absolute: record.delta_absolute,
                delta_percentage: (!record.delta_percentage.is_nan())
                    .then_some(record.delta_percentage),
            })
            .collect(),
    })
}

pub fn write_variance_csv(
    records: &[VarianceRecord],
    output: Option<&Path>,
    delimiter: u8,
) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(output, delimiter)?;
    writer.write_record(VARIANCE_COLUMNS)?;
    for record in records {
        writer.write_record(&[
            record.entity.clone(),
            record.metric_name.clone(),
            record.current_period.clone(),
            record.prior_period.clone(),
            format_cell(record.current_value),
            format_cell(record.prior_value),
            format_cell(record.delta_absolute),
            format_cell(record.delta_percentage),
            format_effect(record.price_effect),
            format_effect(record.volume_effect),
            format_effect(record.interaction_effect),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn format_effect(value: Option<f64>) -> String {
    value.map(format_cell).unwrap_or_default()
}
