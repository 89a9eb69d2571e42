//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::Result;
use infrapsd_features::batch::EventKind;
use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Parser)]
#[command(name = "infrapsd")]
#[command(about = "Infrasound PSD feature extraction and earthquake scanning")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute PSD windows for every event of a raw event archive
    Process(crate::process::Args),

    /// Featurize a recorded waveform in back-to-back segments
    Scan(crate::scan::Args),

    /// Stack a PSD archive into a dataset tensor
    Inspect(crate::inspect::Args),
}

/// Pipeline overrides shared by the processing subcommands.
#[derive(Args, Clone, Debug, Default)]
pub struct PipelineArgs {
    /// JSON pipeline configuration (missing fields take defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Input sample rate in Hz
    #[arg(long)]
    pub fs_in: Option<u32>,

    /// Working sample rate in Hz
    #[arg(long)]
    pub fs_out: Option<u32>,
}

/// Station and sensor the waveform was recorded on.
#[derive(Args, Clone, Debug)]
pub struct ChannelArgs {
    /// Station (box) id
    #[arg(long, default_value = "parost2")]
    pub station: String,

    /// Sensor id
    #[arg(long, default_value = "141929")]
    pub sensor: String,
}

/// Kind of events in a raw archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Earthquake,
    Background,
}

impl From<KindArg> for EventKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Earthquake => EventKind::Earthquake,
            KindArg::Background => EventKind::Background,
        }
    }
}

/// Command line secret that never shows up in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(pub String);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

impl FromStr for Secret {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Secret(s.to_string()))
    }
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::Process(args) => crate::process::execute(args.try_into()?),
        Commands::Scan(args) => crate::scan::execute(args.try_into()?),
        Commands::Inspect(args) => crate::inspect::execute(args.try_into()?),
    }
}
