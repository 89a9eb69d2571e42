//! Pipeline configuration.
//!
//! Every rate, window geometry and threshold the pipeline depends on lives in
//! [`PipelineConfig`]. Batch and live drivers take the same config by
//! reference, so training-time and inference-time features share one set of
//! numbers.

use crate::error::ConfigError;
use crate::window::{PadPolicy, WindowConfig, WindowGate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Input sample rate of the sensor (Hz)
pub const DEFAULT_FS_IN: u32 = 20;

/// Working sample rate all windowing and PSD logic assumes (Hz)
pub const DEFAULT_FS_OUT: u32 = 100;

/// Window duration in seconds
pub const DEFAULT_WINDOW_DURATION: f64 = 10.0;

/// Fraction of overlap between consecutive windows
pub const DEFAULT_OVERLAP: f64 = 0.5;

/// Welch segment duration in seconds
pub const DEFAULT_PSD_SEGMENT_DURATION: f64 = 5.0;

/// Fraction of overlap between Welch segments
pub const DEFAULT_PSD_OVERLAP: f64 = 0.75;

/// Highest PSD frequency kept (Hz, inclusive)
pub const DEFAULT_FREQ_CUTOFF: f64 = 10.0;

/// Shortest waveform (working-rate samples) that may be zero-padded
pub const DEFAULT_PAD_LOW_THRESHOLD: usize = 5700;

/// Length a near-complete waveform is zero-padded to
pub const DEFAULT_PAD_TARGET: usize = 6000;

/// Minimum window count for the batch driver to accept an event
pub const DEFAULT_MIN_WINDOWS_BATCH: usize = 11;

/// Exact window count the live driver requires
pub const DEFAULT_REQUIRED_WINDOWS_LIVE: usize = 11;

/// Duration of one live/range segment in seconds
pub const DEFAULT_SEGMENT_DURATION: u32 = 60;

/// Pole of the DC-blocking filter
pub const DEFAULT_DC_BLOCK_COEFFICIENT: f64 = 0.999;

/// High-pass cutoff applied after DC blocking (Hz)
pub const DEFAULT_HIGHPASS_CUTOFF: f64 = 0.1;

/// Butterworth order used for the anti-alias and high-pass filters
pub const DEFAULT_FILTER_ORDER: usize = 4;

/// Signal-to-feature pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fs_in: u32,
    pub fs_out: u32,
    pub window_duration_s: f64,
    pub overlap: f64,
    pub psd_segment_duration_s: f64,
    pub psd_overlap_fraction: f64,
    pub freq_cutoff_hz: f64,
    pub pad_low_threshold: usize,
    pub pad_target: usize,
    pub min_windows_batch: usize,
    pub required_windows_live: usize,
    pub segment_duration_s: u32,
    pub dc_block_coefficient: f64,
    pub highpass_cutoff_hz: f64,
    pub filter_order: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fs_in: DEFAULT_FS_IN,
            fs_out: DEFAULT_FS_OUT,
            window_duration_s: DEFAULT_WINDOW_DURATION,
            overlap: DEFAULT_OVERLAP,
            psd_segment_duration_s: DEFAULT_PSD_SEGMENT_DURATION,
            psd_overlap_fraction: DEFAULT_PSD_OVERLAP,
            freq_cutoff_hz: DEFAULT_FREQ_CUTOFF,
            pad_low_threshold: DEFAULT_PAD_LOW_THRESHOLD,
            pad_target: DEFAULT_PAD_TARGET,
            min_windows_batch: DEFAULT_MIN_WINDOWS_BATCH,
            required_windows_live: DEFAULT_REQUIRED_WINDOWS_LIVE,
            segment_duration_s: DEFAULT_SEGMENT_DURATION,
            dc_block_coefficient: DEFAULT_DC_BLOCK_COEFFICIENT,
            highpass_cutoff_hz: DEFAULT_HIGHPASS_CUTOFF,
            filter_order: DEFAULT_FILTER_ORDER,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check rates, overlaps and window geometry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for fs in [self.fs_in, self.fs_out] {
            if fs == 0 {
                return Err(ConfigError::InvalidSampleRate(fs));
            }
        }

        for overlap in [self.overlap, self.psd_overlap_fraction] {
            if !(0.0..1.0).contains(&overlap) {
                return Err(ConfigError::InvalidOverlap(overlap));
            }
        }

        for (name, samples) in [
            ("window length", self.window_len()),
            ("window stride", self.stride()),
            ("psd segment length", self.psd_segment_len()),
            ("segment length", self.segment_len()),
        ] {
            if samples == 0 {
                return Err(ConfigError::InvalidLength { name, samples });
            }
        }

        if self.psd_segment_len() > self.window_len() {
            return Err(ConfigError::SegmentExceedsWindow {
                segment: self.psd_segment_len(),
                window: self.window_len(),
            });
        }

        if self.pad_low_threshold > self.pad_target {
            return Err(ConfigError::InvalidPadPolicy {
                low: self.pad_low_threshold,
                target: self.pad_target,
            });
        }

        let nyquist = self.fs_out as f64 / 2.0;
        let wn = self.highpass_cutoff_hz / nyquist;
        if !(wn > 0.0 && wn < 1.0) {
            return Err(ConfigError::InvalidCutoff(wn));
        }

        Ok(())
    }

    /// Window length in working-rate samples.
    pub fn window_len(&self) -> usize {
        (self.window_duration_s * self.fs_out as f64) as usize
    }

    /// Step between window starts in working-rate samples.
    pub fn stride(&self) -> usize {
        (self.window_len() as f64 * (1.0 - self.overlap)) as usize
    }

    /// Live/range segment length in input-rate samples.
    pub fn segment_len(&self) -> usize {
        self.segment_duration_s as usize * self.fs_in as usize
    }

    /// Welch segment length in working-rate samples.
    pub fn psd_segment_len(&self) -> usize {
        (self.psd_segment_duration_s * self.fs_out as f64) as usize
    }

    /// Welch segment overlap in samples.
    pub fn psd_overlap_len(&self) -> usize {
        (self.psd_segment_len() as f64 * self.psd_overlap_fraction) as usize
    }

    /// FFT length: next power of two at or above the segment length.
    pub fn nfft(&self) -> usize {
        self.psd_segment_len().next_power_of_two()
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig::new(self.window_len(), self.stride())
    }

    pub fn pad_policy(&self) -> PadPolicy {
        PadPolicy::new(self.pad_low_threshold, self.pad_target)
    }

    pub fn batch_gate(&self) -> WindowGate {
        WindowGate::AtLeast(self.min_windows_batch)
    }

    pub fn live_gate(&self) -> WindowGate {
        WindowGate::Exactly(self.required_windows_live)
    }
}

/// Access credentials for the waveform store.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Station and sensor a pipeline queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub station_id: String,
    pub sensor_id: String,
    #[serde(default)]
    pub credentials: Credentials,
}

impl SourceConfig {
    pub fn new(station_id: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            sensor_id: sensor_id.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Channel key the source uses for this station/sensor pair.
    pub fn channel_key(&self) -> String {
        format!("{}_{}", self.station_id, self.sensor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let config = PipelineConfig::default();

        assert_eq!(config.window_len(), 1000);
        assert_eq!(config.stride(), 500);
        assert_eq!(config.psd_segment_len(), 500);
        assert_eq!(config.psd_overlap_len(), 375);
        assert_eq!(config.nfft(), 512);
        assert_eq!(config.segment_len(), 1200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_rate() {
        let config = PipelineConfig {
            fs_in: 0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn rejects_full_overlap() {
        let config = PipelineConfig {
            overlap: 1.0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOverlap(_))
        ));
    }

    #[test]
    fn rejects_zero_segment_duration() {
        let config = PipelineConfig {
            segment_duration_s: 0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLength {
                name: "segment length",
                samples: 0
            })
        ));
    }

    #[test]
    fn rejects_psd_segment_longer_than_window() {
        let config = PipelineConfig {
            psd_segment_duration_s: 12.0,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::SegmentExceedsWindow {
                segment: 1200,
                window: 1000
            })
        ));
    }

    #[test]
    fn rejects_inverted_pad_policy() {
        let config = PipelineConfig {
            pad_low_threshold: 7000,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPadPolicy { .. })
        ));
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"fs_in": 40}"#).unwrap();

        assert_eq!(config.fs_in, 40);
        assert_eq!(config.fs_out, DEFAULT_FS_OUT);
        assert_eq!(config.pad_target, DEFAULT_PAD_TARGET);
    }

    #[test]
    fn channel_key_joins_station_and_sensor() {
        let source = SourceConfig::new("parost2", "141929");

        assert_eq!(source.channel_key(), "parost2_141929");
    }

    #[test]
    fn credentials_are_redacted() {
        let credentials = Credentials {
            username: None,
            password: "hunter2".into(),
        };

        assert!(!format!("{credentials:?}").contains("hunter2"));
    }
}
