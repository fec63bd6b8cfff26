use anyhow::{Context, Result};
use log::info;

use crate::{canonical, cli::ClassifyArgs, io_utils, registry::MetricRegistry, table};

pub fn execute(args: &ClassifyArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let data = canonical::read_canonical(&args.input, delimiter, encoding)?;
    let registry = MetricRegistry::classify(data.metric_names());

    let headers = vec![
        "metric".to_string(),
        "type".to_string(),
        "driver".to_string(),
        "decomposable".to_string(),
        "priority".to_string(),
    ];
    let rows = census_rows(&registry);
    table::print_table(
        &headers,
        &rows,
        &[
            table::Alignment::Left,
            table::Alignment::Left,
            table::Alignment::Left,
            table::Alignment::Left,
            table::Alignment::Right,
        ],
    );

    if let Some(path) = &args.registry {
        registry
            .save(path)
            .with_context(|| format!("Writing metric registry to {path:?}"))?;
        info!("Metric registry written to {path:?}");
    }
    info!(
        "Classified {} metric(s) from {:?}",
        registry.len(),
        args.input
    );
    Ok(())
}

fn census_rows(registry: &MetricRegistry) -> Vec<Vec<String>> {
    registry
        .iter()
        .map(|metric| {
            vec![
                metric.name.clone(),
                metric.metric_type.to_string(),
                metric.driver_category.to_string(),
                if metric.is_decomposable { "yes" } else { "no" }.to_string(),
                metric.analysis_priority.to_string(),
            ]
        })
        .collect()
}
