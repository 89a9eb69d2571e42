//! Scan subcommand - featurize (and optionally classify) a recorded waveform.

use crate::cli::{ChannelArgs, PipelineArgs, Secret};
use crate::process::format_secs;
use chrono::{DateTime, Utc};
use color_eyre::Section;
use eyre::{Context, Result, eyre};
use infrapsd_features::classifier::OnnxClassifier;
use infrapsd_features::config::{Credentials, PipelineConfig, SourceConfig};
use infrapsd_features::features::NormStats;
use infrapsd_features::live::{LivePipeline, SegmentProcessor};
use infrapsd_features::source::RecordedSource;
#[allow(unused_imports)]
use ort::execution_providers::*;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// CLI arguments for segment scanning.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// Recorded waveform (JSON with `start`, `fs` and `samples`)
    pub input: PathBuf,

    /// Scan start (RFC 3339, default: recording start)
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Scan end (RFC 3339, default: recording end)
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,

    /// Normalization statistics (JSON with `mean` and `std`)
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// ONNX classifier to run on every segment
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Write segment feature vectors to this JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Waveform store user
    #[arg(long)]
    pub username: Option<String>,

    /// Waveform store password
    #[arg(long, env = "INFRAPSD_PASSWORD", hide_env_values = true)]
    pub password: Option<Secret>,

    #[command(flatten)]
    pub channel: ChannelArgs,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

/// Resolved configuration for segment scanning.
#[derive(Debug)]
pub struct Config {
    pub input: PathBuf,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub stats: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        if let (Some(start), Some(end)) = (args.start, args.end)
            && end <= start
        {
            return Err(eyre!("scan end {end} is not after start {start}"))
                .suggestion("swap --start and --end");
        }

        let credentials = Credentials {
            username: args.username,
            password: args.password.map(|s| s.0).unwrap_or_default(),
        };

        Ok(Self {
            input: args.input,
            start: args.start,
            end: args.end,
            stats: args.stats,
            model: args.model,
            output: args.output,
            source: SourceConfig::from(args.channel).with_credentials(credentials),
            pipeline: args.pipeline.try_into()?,
        })
    }
}

/// Continuous recording of one channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct Recording {
    /// Timestamp of the first sample
    pub start: DateTime<Utc>,
    /// Sample rate in Hz
    pub fs: u32,
    pub samples: Vec<f64>,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read recording: {:?}", path.display()))?;
        serde_json::from_str(&text)
            .wrap_err_with(|| format!("invalid recording: {:?}", path.display()))
    }
}

/// One featurized segment as written to the output file.
#[derive(Debug, Serialize)]
struct SegmentRow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    features: Vec<f32>,
}

pub fn execute(config: Config) -> Result<()> {
    let recording = Recording::load(&config.input)?;

    if recording.fs != config.pipeline.fs_in {
        tracing::warn!(
            recording = recording.fs,
            configured = config.pipeline.fs_in,
            "recording rate differs from configured input rate"
        );
    }

    let source = RecordedSource::new(
        config.source.channel_key(),
        recording.start,
        recording.fs,
        recording.samples,
    );
    let start = config.start.unwrap_or(source.start());
    let end = config.end.unwrap_or(source.end());

    let stats = config
        .stats
        .as_deref()
        .map(NormStats::load)
        .transpose()?;

    let processor = SegmentProcessor::new(config.pipeline, stats)
        .wrap_err("failed to build segment processor")
        .suggestion("normalization statistics must match the configured feature length")?;

    tracing::info!(
        input = ?config.input.display(),
        %start,
        %end,
        features = processor.feature_len(),
        "scanning recording"
    );

    let pipeline = LivePipeline::new(source, config.source, processor);

    let s = Instant::now();

    if let Some(model) = config.model.as_deref() {
        let mut classifier = build_classifier(model)?;
        let detections = pipeline
            .classify_range(&mut classifier, start, end)
            .wrap_err("classification failed")?;

        for d in &detections {
            println!(
                "{} {} {} {:.3}",
                d.start.to_rfc3339(),
                d.end.to_rfc3339(),
                d.prediction.label,
                d.prediction.confidence()
            );
        }
    } else {
        let segments = pipeline.range(start, end);

        if let Some(output) = config.output.as_deref() {
            let rows: Vec<_> = segments
                .iter()
                .map(|s| SegmentRow {
                    start: s.start,
                    end: s.end,
                    features: s.features.to_vec(),
                })
                .collect();
            let json = serde_json::to_string(&rows)?;
            std::fs::write(output, json)
                .wrap_err_with(|| format!("failed to write features: {:?}", output.display()))?;

            tracing::info!(path = ?output.display(), "write segment features");
        }

        println!("{} segments featurized", segments.len());
    }

    let d = s.elapsed();
    tracing::info!(duration = %format_secs(d.as_secs_f32()), "scan completed");

    Ok(())
}

/// Build the ONNX classifier with execution providers configured by Cargo features.
///
/// The first available provider is used; CPU is always available as fallback.
fn build_classifier(model: &Path) -> Result<OnnxClassifier> {
    tracing::info!(path = ?model.display(), "loading classifier");

    let builder: SessionBuilder = Session::builder()?.with_execution_providers([
        #[cfg(feature = "cuda")]
        CUDAExecutionProvider::default().build(),
        #[cfg(feature = "tensorrt")]
        TensorRTExecutionProvider::default().build(),
        #[cfg(feature = "openvino")]
        OpenVINOExecutionProvider::default().build(),
        #[cfg(feature = "directml")]
        DirectMLExecutionProvider::default().build(),
        #[cfg(feature = "coreml")]
        CoreMLExecutionProvider::default().build(),
        #[cfg(feature = "xnnpack")]
        XNNPACKExecutionProvider::default().build(),
    ])?;

    OnnxClassifier::from_file(model, Some(builder))
}
