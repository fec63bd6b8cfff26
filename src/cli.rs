use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::canonical::CollisionPolicy;
use crate::variance::{ProxyPairing, TOP_MOVER_LIMIT};

#[derive(Debug, Parser)]
#[command(author, version, about = "Analyze variance in CSV files without a fixed schema", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer column roles (time, entity, measure) for a tabular file
    Detect(DetectArgs),
    /// Reshape a wide tabular file into canonical long-form records
    Normalize(NormalizeArgs),
    /// Classify canonical metric names into a metric registry
    Classify(ClassifyArgs),
    /// Compute period-over-period variance from canonical records
    Variance(VarianceArgs),
    /// Reconstruct a wide table from canonical long-form records
    Pivot(PivotArgs),
    /// Run the full pipeline and write an analysis bundle
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Input CSV file to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Write the detected schema map to this JSON file
    #[arg(short = 's', long = "schema-map")]
    pub schema_map: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Input CSV file to normalize
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Schema map JSON to use instead of detecting roles
    #[arg(short = 's', long = "schema-map")]
    pub schema_map: Option<PathBuf>,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Canonical long-form CSV to read metric names from
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Write the metric registry to this JSON file
    #[arg(short = 'r', long = "registry")]
    pub registry: Option<PathBuf>,
    /// CSV delimiter character
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct VarianceArgs {
    /// Canonical long-form CSV to analyze
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Metric registry JSON to use instead of classifying on the fly
    #[arg(short = 'r', long = "registry")]
    pub registry: Option<PathBuf>,
    /// Write a JSON summary of the latest period's top movers to this path
    #[arg(long = "summary")]
    pub summary: Option<PathBuf>,
    /// Maximum number of top movers in the summary (0 = all)
    #[arg(long, default_value_t = TOP_MOVER_LIMIT)]
    pub top: usize,
    /// How decomposable metrics are paired with price/volume proxies
    #[arg(long = "pairing", value_enum, default_value = "first-listed")]
    pub pairing: PairingMode,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PivotArgs {
    /// Canonical long-form CSV to pivot back to wide form
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// How duplicate (period, entity, metric) observations resolve
    #[arg(long = "collisions", value_enum, default_value = "first")]
    pub collisions: CollisionMode,
    /// CSV delimiter character for reading input
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Delimiter to use for output (defaults to input delimiter)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input CSV file to run the full pipeline on
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Directory for analysis artifacts (defaults to <input>_analysis beside the input)
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// Schema map JSON to use instead of detecting roles
    #[arg(short = 's', long = "schema-map")]
    pub schema_map: Option<PathBuf>,
    /// How decomposable metrics are paired with price/volume proxies
    #[arg(long = "pairing", value_enum, default_value = "first-listed")]
    pub pairing: PairingMode,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum CollisionMode {
    First,
    Last,
    Error,
}

impl Default for CollisionMode {
    fn default() -> Self {
        CollisionMode::First
    }
}

impl From<CollisionMode> for CollisionPolicy {
    fn from(mode: CollisionMode) -> Self {
        match mode {
            CollisionMode::First => CollisionPolicy::FirstWins,
            CollisionMode::Last => CollisionPolicy::LastWins,
            CollisionMode::Error => CollisionPolicy::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum PairingMode {
    FirstListed,
    Disabled,
}

impl Default for PairingMode {
    fn default() -> Self {
        PairingMode::FirstListed
    }
}

impl From<PairingMode> for ProxyPairing {
    fn from(mode: PairingMode) -> Self {
        match mode {
            PairingMode::FirstListed => ProxyPairing::FirstListed,
            PairingMode::Disabled => ProxyPairing::Disabled,
        }
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
