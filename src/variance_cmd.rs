use anyhow::{Context, Result};
use log::info;

use crate::{
    canonical,
    cli::VarianceArgs,
    io_utils,
    registry::MetricRegistry,
    variance,
};

pub fn execute(args: &VarianceArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let data = canonical::read_canonical(&args.input, delimiter, encoding)?;

    let registry = match &args.registry {
        Some(path) => MetricRegistry::load(path)
            .with_context(|| format!("Loading metric registry from {path:?}"))?,
        None => MetricRegistry::classify(data.metric_names()),
    };

    let records = variance::compute_variance(&data, &registry, args.pairing.into());
    info!(
        "Computed {} variance record(s) from {:?}",
        records.len(),
        args.input
    );

    let output_delimiter = io_utils::resolve_output_delimiter(
        args.output.as_deref(),
        args.output_delimiter,
        delimiter,
    );
    variance::write_variance_csv(&records, args.output.as_deref(), output_delimiter)?;
    if let Some(path) = &args.output {
        info!("Variance records written to {path:?}");
    }

    if let Some(path) = &args.summary {
        match variance::summarize(&records, args.top) {
            Some(summary) => {
                summary.save(path)?;
                info!("Variance summary written to {path:?}");
            }
            None => info!("No variance records to summarize; skipping {path:?}"),
        }
    }
    Ok(())
}
