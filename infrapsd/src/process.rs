//! Process subcommand - raw event archive to PSD archive.

use crate::cli::{ChannelArgs, KindArg, PipelineArgs};
use color_eyre::Section;
use eyre::{Context, Result, eyre};
use infrapsd_features::archive::{EventArchive, save_psd_archive};
use infrapsd_features::batch::{BatchProcessor, EventKind};
use infrapsd_features::config::{PipelineConfig, SourceConfig};
use std::path::PathBuf;
use std::time::Instant;

/// CLI arguments for batch PSD extraction.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Raw event archive (JSON)
    pub input: PathBuf,

    /// Output PSD archive (default: input with .psd.json extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Kind of events in the archive
    #[arg(long, value_enum, default_value_t = KindArg::Earthquake)]
    pub kind: KindArg,

    #[command(flatten)]
    pub channel: ChannelArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Resolved configuration for batch PSD extraction.
#[derive(Debug)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: EventKind,
    pub channel: String,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        let output = args
            .output
            .unwrap_or_else(|| args.input.with_extension("psd.json"));

        if output == args.input {
            return Err(eyre!("output would overwrite input: {:?}", output.display()))
                .suggestion("pass a different path with --output");
        }

        Ok(Self {
            input: args.input,
            output,
            kind: args.kind.into(),
            channel: SourceConfig::from(args.channel).channel_key(),
            pipeline: args.pipeline.try_into()?,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    tracing::info!(
        input = ?config.input.display(),
        kind = %config.kind,
        channel = config.channel,
        "processing events"
    );

    let archive = EventArchive::load(&config.input)
        .wrap_err_with(|| format!("failed to load archive: {:?}", config.input.display()))?;

    let processor = BatchProcessor::new(config.pipeline, config.kind, config.channel)?;

    let s = Instant::now();
    let report = processor.run(&archive);
    let d = s.elapsed();

    tracing::info!(duration = %format_secs(d.as_secs_f32()), "processing completed");

    if report.accepted == 0 && !archive.is_empty() {
        tracing::warn!("no events accepted, writing empty archive");
    }

    save_psd_archive(&config.output, &report.results)
        .wrap_err_with(|| format!("failed to write psd archive: {:?}", config.output.display()))?;

    tracing::info!(path = ?config.output.display(), "write psd archive");

    println!(
        "{} accepted, {} skipped, {} errored of {} events",
        report.accepted,
        report.skipped,
        report.errored,
        report.total()
    );

    Ok(())
}

/// Format seconds as a string with two decimal places.
pub(crate) fn format_secs(secs: f32) -> String {
    format!("{:.2}s", secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str, output: Option<&str>) -> Args {
        Args {
            input: input.into(),
            output: output.map(PathBuf::from),
            kind: KindArg::Background,
            channel: ChannelArgs {
                station: "parost2".into(),
                sensor: "141929".into(),
            },
            pipeline: PipelineArgs::default(),
        }
    }

    #[test]
    fn output_defaults_next_to_input() {
        let config = Config::try_from(args("data/background.json", None)).unwrap();

        assert_eq!(config.output, PathBuf::from("data/background.psd.json"));
        assert_eq!(config.channel, "parost2_141929");
        assert_eq!(config.kind, EventKind::Background);
    }

    #[test]
    fn refuses_to_overwrite_input() {
        assert!(Config::try_from(args("events.json", Some("events.json"))).is_err());
    }

    #[test]
    fn formats_seconds() {
        assert_eq!(format_secs(1.234), "1.23s");
    }
}
