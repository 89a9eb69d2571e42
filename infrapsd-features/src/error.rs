//! Error types for infrapsd-features organized by processing stage.

use crate::window::WindowGate;
use ndarray::ShapeError;
use thiserror::Error;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signal processing stage error
    #[error(transparent)]
    Dsp(#[from] DspError),

    /// Feature assembly stage error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Archive loading or saving error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Waveform source error
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Model inference stage error
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Configuration errors (rates, window geometry, padding thresholds).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sample rate must be positive
    #[error("invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// Overlap fraction outside `[0, 1)`
    #[error("invalid overlap fraction: {0} (expected 0 <= overlap < 1)")]
    InvalidOverlap(f64),

    /// Window or segment geometry collapses to zero samples
    #[error("invalid {name}: {samples} samples")]
    InvalidLength { name: &'static str, samples: usize },

    /// Welch segment does not fit in one window
    #[error("psd segment of {segment} samples exceeds window of {window} samples")]
    SegmentExceedsWindow { segment: usize, window: usize },

    /// Padding threshold above padding target
    #[error("invalid pad policy: threshold {low} exceeds target {target}")]
    InvalidPadPolicy { low: usize, target: usize },

    /// Filter cutoff outside `(0, 1)` once normalized to Nyquist
    #[error("invalid filter cutoff: {0} (normalized, expected 0 < wn < 1)")]
    InvalidCutoff(f64),

    /// IO error while reading a configuration file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Filtering, resampling and spectral estimation errors.
#[derive(Debug, Error)]
pub enum DspError {
    /// Input too short for zero-phase filter edge padding
    #[error("signal too short for zero-phase filtering: {len} samples (need more than {required})")]
    SignalTooShort { len: usize, required: usize },

    /// Window shorter than one Welch segment
    #[error("window too short for welch estimate: {len} samples (segment {segment})")]
    SegmentTooShort { len: usize, segment: usize },

    /// Filter denominator is zero at the leading coefficient
    #[error("invalid filter: leading denominator coefficient is zero")]
    DegenerateFilter,

    /// Non-finite sample found in the input
    #[error("non-finite sample at index {0}")]
    NonFinite(usize),
}

/// Feature assembly errors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// PSD windows do not share the same number of bins
    #[error("ragged psd windows: window {ordinal} has {found} bins, expected {expected}")]
    RaggedWindows {
        ordinal: usize,
        found: usize,
        expected: usize,
    },

    /// No PSD windows supplied
    #[error("no psd windows to assemble")]
    Empty,

    /// Normalization statistics do not match the flattened vector
    #[error("feature length mismatch: vector has {features} values, statistics have {stats}")]
    LengthMismatch { features: usize, stats: usize },

    /// Mean and std vectors differ in length
    #[error("invalid normalization statistics: mean has {mean} values, std has {std}")]
    InvalidStats { mean: usize, std: usize },

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Archive reading and writing errors. These are fatal to a run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// IO error on the archive path
    #[error("archive io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Archive content is not valid
    #[error("malformed archive {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Waveform source errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The query returned nothing for the requested channel
    #[error("no data for {channel} between {start} and {end}")]
    NoData {
        channel: String,
        start: String,
        end: String,
    },

    /// The backing store failed
    #[error("waveform query failed: {0}")]
    Query(String),
}

/// Classifier inference errors (ONNX, ndarray operations).
#[derive(Debug, Error)]
pub enum ModelError {
    /// Missing expected output tensor
    #[error("missing model output: {name}")]
    MissingOutput { name: String },

    /// Output tensor does not hold two class logits
    #[error("unexpected model output shape: {0:?}")]
    UnexpectedShape(Vec<usize>),

    /// ONNX Runtime error
    #[error(transparent)]
    Ort(#[from] ort::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result type alias for infrapsd-features operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// ort::Error → ModelError → Error
impl From<ort::Error> for Error {
    fn from(e: ort::Error) -> Self {
        Error::Model(ModelError::Ort(e))
    }
}

/// Reason a single unit of work (event or segment) was not accepted.
///
/// These never abort a run. Drivers log them with the unit's identifier and
/// move on to the next unit.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source query returned no data or failed
    #[error("waveform unavailable: {0}")]
    FetchUnavailable(String),

    /// Waveform shorter than required before windowing
    #[error("not enough samples ({len}, need {required})")]
    InsufficientSamples { len: usize, required: usize },

    /// Waveform too short for zero-phase filter stability
    #[error("signal too short for filtering ({len} samples, need more than {required})")]
    SignalTooShort { len: usize, required: usize },

    /// Window count failed the batch or live gate
    #[error("{found} windows (need {gate})")]
    WindowCountMismatch { found: usize, gate: WindowGate },

    /// Event record is missing a channel, metadata or samples
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Any other fault surfaced by a processing stage
    #[error(transparent)]
    Unexpected(Error),
}

impl PipelineError {
    /// Whether the unit was skipped by a validity gate rather than a fault.
    pub fn is_skip(&self) -> bool {
        !matches!(
            self,
            PipelineError::MalformedRecord(_) | PipelineError::Unexpected(_)
        )
    }
}

impl From<DspError> for PipelineError {
    fn from(e: DspError) -> Self {
        match e {
            DspError::SignalTooShort { len, required } => {
                PipelineError::SignalTooShort { len, required }
            }
            other => PipelineError::Unexpected(Error::Dsp(other)),
        }
    }
}

impl From<FeatureError> for PipelineError {
    fn from(e: FeatureError) -> Self {
        PipelineError::Unexpected(Error::Feature(e))
    }
}

impl From<ConfigError> for PipelineError {
    fn from(e: ConfigError) -> Self {
        PipelineError::Unexpected(Error::Config(e))
    }
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        PipelineError::FetchUnavailable(e.to_string())
    }
}

impl From<Error> for PipelineError {
    fn from(e: Error) -> Self {
        match e {
            Error::Dsp(e) => e.into(),
            Error::Source(e) => e.into(),
            other => PipelineError::Unexpected(other),
        }
    }
}
