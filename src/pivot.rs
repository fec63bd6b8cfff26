use anyhow::Result;
use log::info;

use crate::{canonical, cli::PivotArgs, io_utils};

pub fn execute(args: &PivotArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let data = canonical::read_canonical(&args.input, delimiter, encoding)?;
    let frame = canonical::from_canonical(&data, args.collisions.into())?;

    let output_delimiter = io_utils::resolve_output_delimiter(
        args.output.as_deref(),
        args.output_delimiter,
        delimiter,
    );
    frame.write_csv(args.output.as_deref(), output_delimiter)?;
    info!(
        "Pivoted {} canonical record(s) into {} wide row(s)",
        data.len(),
        frame.row_count()
    );
    if let Some(path) = &args.output {
        info!("Wide table written to {path:?}");
    }
    Ok(())
}
