//! Garment segmentation CLI tool
//!
//! Segments one image, writes the artifacts and prints the result document
//! on stdout. All diagnostics go to stderr.

use super::config::CliConfigBuilder;
use crate::{
    processor::GarmentProcessor,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

/// Garment silhouette extraction and color palette analysis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "garment-seg")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(short, long, value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory receiving the mask, crop and masked image artifacts
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Weight blob (native) or ONNX model (tract) for the learned segmenter
    #[arg(long, value_name = "PATH")]
    pub weights: Option<PathBuf>,

    /// Expected SHA-256 hex digest of the weights file
    #[arg(long, value_name = "HEX")]
    pub weights_sha256: Option<String>,

    /// Inference backend for the learned segmenter
    #[arg(long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Skip the learned segmenter and use the heuristic pipeline only
    #[arg(long)]
    pub no_learned: bool,

    /// Use the learned segmenter even with randomly initialised weights
    #[arg(long)]
    pub accept_untrained: bool,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Color sampling step (1 = every pixel)
    #[arg(short, long)]
    pub quality: Option<u32>,

    /// Maximum number of palette colors
    #[arg(short, long)]
    pub palette_size: Option<usize>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pub pretty: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Diagnostic output format on stderr
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Native,
    Tract,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => Self::Json,
        }
    }
}

/// Entry point of the `garment-seg` binary
///
/// Exits successfully whenever a result document was printed, including
/// `"success": false` documents. Only configuration and stdout failures are
/// returned as errors.
pub fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, cli.log_format.into())
        .context("Failed to initialize tracing")?;
    let span = spans::session(&session_id);
    let _enter = span.enter();

    let document = execute(&cli)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{document}").context("Failed to write result to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Run one invocation and render its result document
pub(crate) fn execute(cli: &Cli) -> Result<String> {
    let config = CliConfigBuilder::from_cli(cli).context("Failed to build configuration")?;

    info!(input = %cli.input.display(), learned = config.learned.enabled, "Starting garment segmentation");

    let mut processor =
        GarmentProcessor::new(config).context("Failed to create garment processor")?;
    let result = processor.process_file(&cli.input, cli.output.as_deref());

    if let Some(error) = result.error() {
        info!(error = %error, "Segmentation failed");
    }
    result.to_json(cli.pretty).context("Failed to render result")
}
