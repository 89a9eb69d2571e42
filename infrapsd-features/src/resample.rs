//! Anti-aliased rational resampling.

use crate::config::PipelineConfig;
use crate::error::{ConfigError, DspError, Result};
use crate::filter::{FilterKind, IirFilter, dc_block};
use std::f64::consts::PI;

/// Kaiser window shape parameter for the polyphase FIR
const KAISER_BETA: f64 = 5.0;

/// FIR half length per unit of the larger rate factor
const HALF_LEN_PER_RATE: usize = 10;

/// Rational polyphase resampler for a fixed `fs_in -> fs_out` ratio.
///
/// Upsamples by `up`, applies a Kaiser-windowed sinc low-pass, downsamples
/// by `down` and trims the FIR group delay so output sample 0 aligns with
/// input sample 0.
#[derive(Clone, Debug)]
pub struct PolyphaseResampler {
    pub up: usize,
    pub down: usize,
    taps: Vec<f64>,
    half_len: usize,
}

impl PolyphaseResampler {
    /// Design the resampler for `fs_out / fs_in`, reduced by their gcd.
    pub fn new(fs_in: u32, fs_out: u32) -> std::result::Result<Self, ConfigError> {
        for fs in [fs_in, fs_out] {
            if fs == 0 {
                return Err(ConfigError::InvalidSampleRate(fs));
            }
        }

        let g = gcd(fs_in as usize, fs_out as usize);
        let up = fs_out as usize / g;
        let down = fs_in as usize / g;

        if up == 1 && down == 1 {
            return Ok(Self {
                up,
                down,
                taps: vec![1.0],
                half_len: 0,
            });
        }

        let max_rate = up.max(down);
        let half_len = HALF_LEN_PER_RATE * max_rate;
        let mut taps = firwin(2 * half_len + 1, 1.0 / max_rate as f64, KAISER_BETA);
        taps.iter_mut().for_each(|h| *h *= up as f64);

        Ok(Self {
            up,
            down,
            taps,
            half_len,
        })
    }

    /// Output length for an input of `len` samples: `ceil(len * up / down)`.
    pub fn output_len(&self, len: usize) -> usize {
        (len * self.up).div_ceil(self.down)
    }

    /// Resample `x`. Identity ratios return a copy.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        if self.up == 1 && self.down == 1 {
            return x.to_vec();
        }
        if x.is_empty() {
            return Vec::new();
        }

        // Leading zeros make the delay removal land on a whole output sample
        let pre_pad = self.down - self.half_len % self.down;
        let pre_remove = (self.half_len + pre_pad) / self.down;
        let n_out = self.output_len(x.len());

        let mut h = vec![0.0; pre_pad];
        h.extend_from_slice(&self.taps);
        while upfirdn_len(h.len(), x.len(), self.up, self.down) < n_out + pre_remove {
            h.push(0.0);
        }

        (pre_remove..pre_remove + n_out)
            .map(|k| self.output_sample(&h, x, k))
            .collect()
    }

    /// One sample of upsample -> FIR -> downsample, visiting only the polyphase
    /// branch that touches non-zero upsampled inputs.
    fn output_sample(&self, h: &[f64], x: &[f64], k: usize) -> f64 {
        let t = k * self.down;
        let mut acc = 0.0;
        let mut j = t % self.up;
        while j < h.len() && j <= t {
            let xi = (t - j) / self.up;
            if xi < x.len() {
                acc += h[j] * x[xi];
            }
            j += self.up;
        }
        acc
    }
}

/// Full `upfirdn` output length.
fn upfirdn_len(len_h: usize, len_x: usize, up: usize, down: usize) -> usize {
    ((len_x - 1) * up + len_h - 1) / down + 1
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Windowed-sinc low-pass FIR with unit DC gain.
///
/// `cutoff` is normalized to Nyquist.
fn firwin(numtaps: usize, cutoff: f64, beta: f64) -> Vec<f64> {
    let alpha = (numtaps - 1) as f64 / 2.0;
    let window = kaiser(numtaps, beta);

    let h: Vec<f64> = (0..numtaps)
        .map(|n| {
            let m = n as f64 - alpha;
            cutoff * sinc(cutoff * m) * window[n]
        })
        .collect();

    let sum: f64 = h.iter().sum();
    h.into_iter().map(|v| v / sum).collect()
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Symmetric Kaiser window.
fn kaiser(len: usize, beta: f64) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }

    let denom = bessel_i0(beta);
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let r = 2.0 * n as f64 / span - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Modified Bessel function of the first kind, order 0.
///
/// Power series summed until terms stop contributing at double precision.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    let mut k = 1.0;

    while term > sum * 1e-17 {
        term *= (half / k) * (half / k);
        sum += term;
        k += 1.0;
    }

    sum
}

/// Resample a waveform from `fs_in` to `fs_out`.
///
/// DC-blocks and applies a zero-phase Butterworth anti-alias low-pass at
/// `0.9 * min(fs_in, fs_out) / 2` before polyphase resampling. Both filters
/// run even when the rates are equal; only the polyphase stage degenerates
/// to a copy.
///
/// # Errors
///
/// Returns an error for zero rates, non-finite samples, or inputs too short
/// for zero-phase filtering.
pub fn resample(x: &[f64], fs_in: u32, fs_out: u32, config: &PipelineConfig) -> Result<Vec<f64>> {
    let resampler = PolyphaseResampler::new(fs_in, fs_out)?;

    if let Some(i) = x.iter().position(|v| !v.is_finite()) {
        return Err(DspError::NonFinite(i).into());
    }

    let x = dc_block(x, config.dc_block_coefficient)?;

    let cutoff = 0.9 * fs_in.min(fs_out) as f64 / 2.0;
    let wn = cutoff / (fs_in as f64 / 2.0);
    let lowpass = IirFilter::butterworth(config.filter_order, wn, FilterKind::Lowpass)?;
    let x = lowpass.apply_zero_phase(&x)?;

    Ok(resampler.apply(&x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_ratio_by_gcd() {
        let resampler = PolyphaseResampler::new(20, 100).unwrap();

        assert_eq!((resampler.up, resampler.down), (5, 1));

        let resampler = PolyphaseResampler::new(100, 40).unwrap();
        assert_eq!((resampler.up, resampler.down), (2, 5));
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(PolyphaseResampler::new(0, 100).is_err());
        assert!(PolyphaseResampler::new(20, 0).is_err());
    }

    #[test]
    fn output_length_scales_with_ratio() {
        let up = PolyphaseResampler::new(20, 100).unwrap();
        assert_eq!(up.apply(&vec![0.0; 1200]).len(), 6000);

        let down = PolyphaseResampler::new(100, 40).unwrap();
        assert_eq!(down.output_len(1001), 401);
        assert_eq!(down.apply(&vec![0.0; 1001]).len(), 401);
    }

    #[test]
    fn equal_rates_copy_input() {
        let resampler = PolyphaseResampler::new(100, 100).unwrap();
        let x = vec![1.0, -2.0, 3.0];

        assert_eq!(resampler.apply(&x), x);
    }

    #[test]
    fn firwin_has_unit_dc_gain_and_symmetry() {
        let h = firwin(101, 0.2, KAISER_BETA);

        assert!((h.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        for i in 0..50 {
            assert!((h[i] - h[100 - i]).abs() < 1e-14);
        }
    }

    #[test]
    fn bessel_i0_reference_values() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-15);
        // Reference: scipy.special.i0
        assert!((bessel_i0(1.0) - 1.2660658777520082).abs() < 1e-12);
        assert!((bessel_i0(5.0) - 27.239871823604442).abs() < 1e-9);
    }

    #[test]
    fn kaiser_peaks_at_center() {
        let w = kaiser(11, KAISER_BETA);

        assert!((w[5] - 1.0).abs() < 1e-15);
        assert!(w[0] < w[1] && (w[0] - w[10]).abs() < 1e-15);
    }

    #[test]
    fn upsampling_preserves_constant_level() {
        let resampler = PolyphaseResampler::new(20, 100).unwrap();
        let y = resampler.apply(&vec![1.0; 400]);

        // Away from the edges the interpolated level stays at the input level
        for v in &y[200..1800] {
            assert!((v - 1.0).abs() < 1e-2, "{v}");
        }
    }

    #[test]
    fn upsampling_keeps_original_samples_aligned() {
        let resampler = PolyphaseResampler::new(20, 100).unwrap();
        let x: Vec<f64> = (0..400)
            .map(|i| (2.0 * PI * 1.0 * i as f64 / 20.0).sin())
            .collect();
        let y = resampler.apply(&x);

        for i in 50..350 {
            assert!((y[5 * i] - x[i]).abs() < 1e-2, "sample {i}");
        }
    }

    #[test]
    fn resample_is_deterministic() {
        let config = PipelineConfig::default();
        let x: Vec<f64> = (0..1200)
            .map(|i| (i as f64 * 0.37).sin() + 0.01 * i as f64)
            .collect();

        let a = resample(&x, 20, 100, &config).unwrap();
        let b = resample(&x, 20, 100, &config).unwrap();

        assert_eq!(a.len(), 6000);
        assert!(a.iter().zip(&b).all(|(a, b)| (a - b).abs() < 1e-9));
    }

    #[test]
    fn resample_filters_even_at_equal_rates() {
        let config = PipelineConfig::default();
        let x = vec![5.0; 300];
        let y = resample(&x, 100, 100, &config).unwrap();

        assert_eq!(y.len(), 300);
        assert!(y.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn resample_rejects_non_finite() {
        let config = PipelineConfig::default();
        let mut x = vec![0.0; 100];
        x[42] = f64::NAN;

        assert!(matches!(
            resample(&x, 20, 100, &config),
            Err(crate::error::Error::Dsp(DspError::NonFinite(42)))
        ));
    }

    #[test]
    fn resample_rejects_short_input() {
        let config = PipelineConfig::default();

        assert!(matches!(
            resample(&[1.0; 5], 20, 100, &config),
            Err(crate::error::Error::Dsp(DspError::SignalTooShort { .. }))
        ));
    }
}
