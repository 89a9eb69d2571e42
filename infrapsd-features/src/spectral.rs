//! Welch power spectral density estimation.

use crate::config::PipelineConfig;
use crate::error::{ConfigError, DspError};
use crate::types::PsdWindow;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// Band-limited Welch PSD estimator.
///
/// Averages one-sided density periodograms of mean-detrended, Hann-tapered
/// segments and keeps bins at or below the cutoff frequency. The FFT plan is
/// built once, so repeated calls on the same window give identical output.
#[derive(Clone)]
pub struct WelchEstimator {
    fs: f64,
    segment: usize,
    overlap: usize,
    nfft: usize,
    cutoff: f64,
    taper: Vec<f64>,
    scale: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for WelchEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WelchEstimator")
            .field("fs", &self.fs)
            .field("segment", &self.segment)
            .field("overlap", &self.overlap)
            .field("nfft", &self.nfft)
            .field("cutoff", &self.cutoff)
            .finish()
    }
}

impl WelchEstimator {
    /// Create an estimator.
    ///
    /// # Arguments
    ///
    /// * `fs` - sample rate of the windows (Hz)
    /// * `segment` - Welch segment length in samples
    /// * `overlap` - samples shared by consecutive segments
    /// * `cutoff` - highest frequency kept (Hz, inclusive)
    pub fn new(fs: u32, segment: usize, overlap: usize, cutoff: f64) -> Result<Self, ConfigError> {
        if fs == 0 {
            return Err(ConfigError::InvalidSampleRate(fs));
        }
        if segment == 0 || overlap >= segment {
            return Err(ConfigError::InvalidLength {
                name: "psd segment length",
                samples: segment,
            });
        }

        let nfft = segment.next_power_of_two();
        let taper = hann_window(segment);
        let fs = fs as f64;
        let scale = 1.0 / (fs * taper.iter().map(|w| w * w).sum::<f64>());

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(nfft);

        Ok(Self {
            fs,
            segment,
            overlap,
            nfft,
            cutoff,
            taper,
            scale,
            fft,
        })
    }

    /// Estimator for working-rate windows described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.fs_out,
            config.psd_segment_len(),
            config.psd_overlap_len(),
            config.freq_cutoff_hz,
        )
    }

    pub fn nfft(&self) -> usize {
        self.nfft
    }

    /// Frequency of one-sided bin `k` (Hz).
    fn bin_frequency(&self, k: usize) -> f64 {
        k as f64 * self.fs / self.nfft as f64
    }

    /// Number of bins kept after the cutoff.
    pub fn freq_bins(&self) -> usize {
        (0..=self.nfft / 2)
            .take_while(|&k| self.bin_frequency(k) <= self.cutoff)
            .count()
    }

    /// Number of Welch segments averaged for a window of `len` samples.
    pub fn segment_count(&self, len: usize) -> usize {
        if len < self.segment {
            return 0;
        }
        (len - self.overlap) / (self.segment - self.overlap)
    }

    /// Estimate the PSD of one window.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::SegmentTooShort`] when the window is shorter than
    /// one segment.
    pub fn estimate(&self, window: &[f64]) -> Result<PsdWindow, DspError> {
        let count = self.segment_count(window.len());
        if count == 0 {
            return Err(DspError::SegmentTooShort {
                len: window.len(),
                segment: self.segment,
            });
        }

        let bins = self.freq_bins();
        let step = self.segment - self.overlap;
        let mut power = vec![0.0; bins];
        let mut buffer = vec![Complex::new(0.0, 0.0); self.nfft];

        for s in 0..count {
            let segment = &window[s * step..s * step + self.segment];
            let mean = segment.iter().sum::<f64>() / self.segment as f64;

            buffer.fill(Complex::new(0.0, 0.0));
            for ((dst, &x), &w) in buffer.iter_mut().zip(segment).zip(&self.taper) {
                *dst = Complex::new((x - mean) * w, 0.0);
            }

            self.fft.process(&mut buffer);

            for (k, p) in power.iter_mut().enumerate() {
                let mut v = buffer[k].norm_sqr() * self.scale;
                // One-sided density doubles everything but DC and Nyquist
                if k != 0 && !(self.nfft % 2 == 0 && k == self.nfft / 2) {
                    v *= 2.0;
                }
                *p += v;
            }
        }

        power.iter_mut().for_each(|p| *p /= count as f64);
        let frequency = (0..bins).map(|k| self.bin_frequency(k)).collect();

        Ok(PsdWindow { power, frequency })
    }
}

/// Symmetric Hann window.
fn hann_window(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let span = (len - 1) as f64;
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / span).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> WelchEstimator {
        WelchEstimator::from_config(&PipelineConfig::default()).unwrap()
    }

    fn tone(freq: f64, amplitude: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / 100.0).sin())
            .collect()
    }

    #[test]
    fn canonical_geometry() {
        let welch = estimator();

        assert_eq!(welch.nfft(), 512);
        assert_eq!(welch.freq_bins(), 52);
        assert_eq!(welch.segment_count(1000), 5);
    }

    #[test]
    fn power_and_frequency_are_parallel_and_band_limited() {
        let psd = estimator().estimate(&tone(3.0, 1.0, 1000)).unwrap();

        assert_eq!(psd.power.len(), psd.frequency.len());
        assert_eq!(psd.power.len(), 52);
        assert!(psd.frequency.iter().all(|&f| f <= 10.0));
        assert_eq!(psd.frequency[0], 0.0);
        assert!((psd.frequency[1] - 100.0 / 512.0).abs() < 1e-12);
    }

    #[test]
    fn detects_tone_frequency() {
        let psd = estimator().estimate(&tone(4.0, 1.0, 1000)).unwrap();

        let peak = psd
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| psd.frequency[i])
            .unwrap();
        assert!((peak - 4.0).abs() < 0.2, "peak at {peak}");
    }

    #[test]
    fn integrated_density_matches_tone_power() {
        // A unit sine carries 0.5 power; the Hann main lobe spreads it over a
        // few bins
        let psd = estimator().estimate(&tone(5.0, 1.0, 1000)).unwrap();
        let df = 100.0 / 512.0;
        let total: f64 = psd.power.iter().sum::<f64>() * df;

        assert!((total - 0.5).abs() < 0.05, "total {total}");
    }

    #[test]
    fn constant_offset_is_detrended() {
        let psd = estimator().estimate(&vec![7.0; 1000]).unwrap();

        assert!(psd.power.iter().all(|&p| p.abs() < 1e-20));
    }

    #[test]
    fn estimate_is_deterministic() {
        let welch = estimator();
        let x = tone(2.5, 3.0, 1000);

        let a = welch.estimate(&x).unwrap();
        let b = welch.estimate(&x).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn rejects_window_shorter_than_segment() {
        let result = estimator().estimate(&[0.0; 499]);

        assert!(matches!(
            result,
            Err(DspError::SegmentTooShort {
                len: 499,
                segment: 500
            })
        ));
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(WelchEstimator::new(100, 500, 500, 10.0).is_err());
        assert!(WelchEstimator::new(0, 500, 375, 10.0).is_err());
    }

    #[test]
    fn hann_is_symmetric_with_zero_ends() {
        let w = hann_window(500);

        assert_eq!(w[0], 0.0);
        assert!(w[499].abs() < 1e-15);
        assert!((w[100] - w[399]).abs() < 1e-12);
    }
}
