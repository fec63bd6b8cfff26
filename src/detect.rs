use anyhow::{Context, Result};
use log::info;

use crate::{cli::DetectArgs, frame::Frame, io_utils, schema, table};

pub fn execute(args: &DetectArgs) -> Result<()> {
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let frame = Frame::read_csv(&args.input, delimiter, encoding)?;
    let map = schema::detect(&frame);

    let headers = vec![
        "#".to_string(),
        "column".to_string(),
        "type".to_string(),
        "role".to_string(),
        "distinct".to_string(),
        "sample".to_string(),
    ];
    let rows = role_rows(&frame, &map);
    table::print_table(&headers, &rows, &[table::Alignment::Right]);

    if let Some(path) = &args.schema_map {
        map.save(path)
            .with_context(|| format!("Writing schema map to {path:?}"))?;
        info!("Schema map written to {path:?}");
    }
    info!(
        "Detected roles for {} column(s) in {:?}",
        frame.column_count(),
        args.input
    );
    Ok(())
}

fn role_rows(frame: &Frame, map: &schema::SchemaMap) -> Vec<Vec<String>> {
    frame
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.primitive.as_str().to_string(),
                map.role_of(&column.name).to_string(),
                format!("{:.1}%", frame.distinct_ratio(idx) * 100.0),
                frame.sample_value(idx).unwrap_or_default(),
            ]
        })
        .collect()
}
