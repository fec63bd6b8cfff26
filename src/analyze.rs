//! End-to-end pipeline: detect roles, normalize, classify, compute
//! variance, and write the artifact bundle into one directory.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    canonical,
    cli::AnalyzeArgs,
    frame::Frame,
    io_utils,
    registry::MetricRegistry,
    schema::{self, SchemaMap},
    table,
    variance::{self, VarianceSummary},
};

const SCHEMA_FILE: &str = "detected_schema.json";
const CANONICAL_FILE: &str = "canonical_data.csv";
const REGISTRY_FILE: &str = "metric_registry.json";
const VARIANCE_FILE: &str = "variance_analysis.csv";
const SUMMARY_FILE: &str = "variance_summary.json";
const REPORT_FILE: &str = "analysis_summary.json";

#[derive(Debug, Serialize)]
struct CanonicalStats {
    total_rows: usize,
    unique_periods: usize,
    unique_entities: usize,
    unique_metrics: usize,
}

#[derive(Debug, Serialize)]
struct MetricStats {
    total: usize,
    by_type: BTreeMap<&'static str, usize>,
    decomposable: Vec<String>,
    priority_metrics: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnalysisSummary<'a> {
    input_file: String,
    rows_analyzed: usize,
    columns_analyzed: usize,
    schema: &'a SchemaMap,
    canonical_format: CanonicalStats,
    metrics: MetricStats,
}

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&args.input));
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;

    let frame = Frame::read_csv(&args.input, delimiter, encoding)?;
    let map = match &args.schema_map {
        Some(path) => SchemaMap::load(path)
            .with_context(|| format!("Loading schema map from {path:?}"))?,
        None => schema::detect(&frame),
    };
    map.save(&output_dir.join(SCHEMA_FILE))?;

    let data = canonical::to_canonical(&frame, &map)?;
    let canonical_path = output_dir.join(CANONICAL_FILE);
    canonical::write_canonical(&data, Some(canonical_path.as_path()), b',')?;

    let registry = MetricRegistry::classify(data.metric_names());
    registry.save(&output_dir.join(REGISTRY_FILE))?;

    let records = variance::compute_variance(&data, &registry, args.pairing.into());
    let variance_path = output_dir.join(VARIANCE_FILE);
    variance::write_variance_csv(&records, Some(variance_path.as_path()), b',')?;

    match variance::summarize(&records, variance::TOP_MOVER_LIMIT) {
        Some(summary) => {
            summary.save(&output_dir.join(SUMMARY_FILE))?;
            print_top_movers(&summary);
        }
        None => info!("No variance records to summarize; skipping {SUMMARY_FILE}"),
    }

    let report = AnalysisSummary {
        input_file: input_file_name(&args.input),
        rows_analyzed: frame.row_count(),
        columns_analyzed: frame.column_count(),
        schema: &map,
        canonical_format: CanonicalStats {
            total_rows: data.len(),
            unique_periods: data.distinct_periods(),
            unique_entities: data.distinct_entities(),
            unique_metrics: data.metric_names().len(),
        },
        metrics: MetricStats {
            total: registry.len(),
            by_type: registry.type_counts(),
            decomposable: registry.decomposable().map(|m| m.name.clone()).collect(),
            priority_metrics: registry
                .priority_metrics()
                .into_iter()
                .map(|m| m.name.clone())
                .collect(),
        },
    };
    save_report(&report, &output_dir.join(REPORT_FILE))?;

    info!("Analysis artifacts written to {output_dir:?}");
    Ok(())
}

/// The report names the file, not the path it was reached through.
fn input_file_name(input: &Path) -> String {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}

fn default_output_dir(input: &Path) -> PathBuf {
    if io_utils::is_dash(input) {
        return PathBuf::from("analysis");
    }
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("analysis");
    input.with_file_name(format!("{stem}_analysis"))
}

fn print_top_movers(summary: &VarianceSummary) {
    info!(
        "Top movers for period {} ({} variance record(s) overall)",
        summary.latest_period, summary.total_variance_records
    );
    let headers = vec![
        "entity".to_string(),
        "metric".to_string(),
        "delta".to_string(),
        "delta_pct".to_string(),
    ];
    let rows = summary
        .top_movers
        .iter()
        .map(|mover| {
            vec![
                mover.entity.clone(),
                mover.metric_name.clone(),
                format!("{:+.2}", mover.delta_absolute),
                mover
                    .delta_percentage
                    .map(|pct| format!("{pct:+.1}%"))
                    .unwrap_or_else(|| "n/a".to_string()),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(
        &headers,
        &rows,
        &[
            table::Alignment::Left,
            table::Alignment::Left,
            table::Alignment::Right,
            table::Alignment::Right,
        ],
    );
}

fn save_report(report: &AnalysisSummary<'_>, path: &Path) -> Result<()> {
    let mut rendered =
        serde_json::to_string_pretty(report).context("Serializing analysis summary to JSON")?;
    rendered.push('\n');
    fs::write(path, rendered).with_context(|| format!("Writing analysis summary {path:?}"))?;
    Ok(())
}
