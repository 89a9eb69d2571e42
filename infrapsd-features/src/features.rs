//! Feature assembly: stack PSD windows, log-compress and z-score.

use crate::error::FeatureError;
use crate::types::PsdWindow;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Offset added before `log10` so zero power stays finite
pub const LOG_EPSILON: f64 = 1e-10;

/// Offset added to the standard deviation before dividing
pub const STD_EPSILON: f64 = 1e-6;

/// Flat model input: `num_windows × freq_bins` values, window-major.
pub type FeatureVector = Array1<f32>;

/// Per-position normalization statistics of log-compressed feature vectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatsFile", into = "StatsFile")]
pub struct NormStats {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

/// On-disk form: `{"mean": [...], "std": [...]}`.
#[derive(Serialize, Deserialize)]
struct StatsFile {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl TryFrom<StatsFile> for NormStats {
    type Error = FeatureError;

    fn try_from(file: StatsFile) -> Result<Self, Self::Error> {
        NormStats::new(Array1::from(file.mean), Array1::from(file.std))
    }
}

impl From<NormStats> for StatsFile {
    fn from(stats: NormStats) -> Self {
        StatsFile {
            mean: stats.mean.to_vec(),
            std: stats.std.to_vec(),
        }
    }
}

impl NormStats {
    pub fn new(mean: Array1<f64>, std: Array1<f64>) -> Result<Self, FeatureError> {
        if mean.len() != std.len() {
            return Err(FeatureError::InvalidStats {
                mean: mean.len(),
                std: std.len(),
            });
        }
        Ok(Self { mean, std })
    }

    /// Column statistics of log-compressed vectors stacked as rows.
    ///
    /// Uses the population standard deviation.
    pub fn fit(features: ArrayView2<f64>) -> Result<Self, FeatureError> {
        let mean = features.mean_axis(Axis(0)).ok_or(FeatureError::Empty)?;
        let std = features.std_axis(Axis(0), 0.0);
        Self::new(mean, std)
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Load statistics from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        use eyre::WrapErr;

        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read normalization stats: {}", path.display()))?;
        serde_json::from_str(&text)
            .wrap_err_with(|| format!("invalid normalization stats: {}", path.display()))
    }

    /// Write statistics as `{"mean": [...], "std": [...]}`.
    pub fn save(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        use eyre::WrapErr;

        let path = path.as_ref();
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write normalization stats: {}", path.display()))
    }

    fn check(&self, len: usize) -> Result<(), FeatureError> {
        if len != self.len() {
            return Err(FeatureError::LengthMismatch {
                features: len,
                stats: self.len(),
            });
        }
        Ok(())
    }
}

/// Stack PSD windows into a `(windows, bins)` matrix.
///
/// # Errors
///
/// Returns [`FeatureError::Empty`] for no windows and
/// [`FeatureError::RaggedWindows`] when bin counts differ.
pub fn stack_windows(psds: &[PsdWindow]) -> Result<Array2<f64>, FeatureError> {
    let first = psds.first().ok_or(FeatureError::Empty)?;
    let bins = first.len();

    let mut flat = Vec::with_capacity(psds.len() * bins);
    for (i, psd) in psds.iter().enumerate() {
        if psd.len() != bins {
            return Err(FeatureError::RaggedWindows {
                ordinal: i + 1,
                found: psd.len(),
                expected: bins,
            });
        }
        flat.extend_from_slice(&psd.power);
    }

    Ok(Array2::from_shape_vec((psds.len(), bins), flat)?)
}

/// Flatten stacked windows row-major and apply `log10(x + LOG_EPSILON)`.
pub fn log_compress(psds: &[PsdWindow]) -> Result<Array1<f64>, FeatureError> {
    let stacked = stack_windows(psds)?;
    let len = stacked.len();
    let flat = stacked.into_shape_with_order(len)?;
    Ok(flat.mapv(|x| (x + LOG_EPSILON).log10()))
}

/// Build the model input vector from a segment's PSD windows.
///
/// Without statistics the output is the log-compressed vector; with them each
/// position is z-scored as `(x - mean) / (std + STD_EPSILON)`.
pub fn assemble(psds: &[PsdWindow], stats: Option<&NormStats>) -> Result<FeatureVector, FeatureError> {
    let log = log_compress(psds)?;

    let features = match stats {
        Some(stats) => {
            stats.check(log.len())?;
            (&log - &stats.mean) / (&stats.std + STD_EPSILON)
        }
        None => log,
    };

    Ok(features.mapv(|v| v as f32))
}

/// Undo the z-score: `z * (std + STD_EPSILON) + mean`.
pub fn denormalize(features: &FeatureVector, stats: &NormStats) -> Result<Array1<f64>, FeatureError> {
    stats.check(features.len())?;
    Ok(features.mapv(f64::from) * (&stats.std + STD_EPSILON) + &stats.mean)
}
