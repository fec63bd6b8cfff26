use anyhow::{Context, Result};
use log::info;

use crate::{canonical, cli::NormalizeArgs, frame::Frame, io_utils, schema};

pub fn execute(args: &NormalizeArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let frame = Frame::read_csv(&args.input, delimiter, encoding)?;

    let map = match &args.schema_map {
        Some(path) => schema::SchemaMap::load(path)
            .with_context(|| format!("Loading schema map from {path:?}"))?,
        None => schema::detect(&frame),
    };

    let data = canonical::to_canonical(&frame, &map)?;

    let output_delimiter = io_utils::resolve_output_delimiter(
        args.output.as_deref(),
        args.output_delimiter,
        delimiter,
    );
    canonical::write_canonical(&data, args.output.as_deref(), output_delimiter)?;
    if let Some(path) = &args.output {
        info!("{} canonical record(s) written to {path:?}", data.len());
    }
    Ok(())
}
