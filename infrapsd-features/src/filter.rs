//! IIR filter design and zero-phase filtering.
//!
//! Filters are kept in transfer-function form (`b`, `a` polynomial
//! coefficients) and applied forward then backward so that no group delay
//! reaches the windowing stage.

use crate::config::PipelineConfig;
use crate::error::{ConfigError, DspError, Result};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Frequency response shape for [`IirFilter::butterworth`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Digital IIR filter in transfer-function form.
///
/// `b` holds numerator and `a` denominator coefficients in descending powers
/// of `z`, both normalized so that `a[0] == 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct IirFilter {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl IirFilter {
    /// Build a filter from raw coefficients, normalizing by `a[0]`.
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> std::result::Result<Self, DspError> {
        let a0 = a.first().copied().unwrap_or(0.0);
        if a0 == 0.0 {
            return Err(DspError::DegenerateFilter);
        }

        // Equal lengths keep the state update loop uniform
        let n = a.len().max(b.len());
        let mut b: Vec<f64> = b.into_iter().map(|v| v / a0).collect();
        let mut a: Vec<f64> = a.into_iter().map(|v| v / a0).collect();
        b.resize(n, 0.0);
        a.resize(n, 0.0);

        Ok(Self { b, a })
    }

    /// First-order DC blocker `(1 - z^-1) / (1 - pole * z^-1)`.
    pub fn dc_block(pole: f64) -> Self {
        Self {
            b: vec![1.0, -1.0],
            a: vec![1.0, -pole],
        }
    }

    /// Digital Butterworth filter.
    ///
    /// `wn` is the cutoff normalized to Nyquist (`0 < wn < 1`). The analog
    /// prototype is pre-warped, frequency transformed and mapped through the
    /// bilinear transform.
    pub fn butterworth(
        order: usize,
        wn: f64,
        kind: FilterKind,
    ) -> std::result::Result<Self, ConfigError> {
        if !(wn > 0.0 && wn < 1.0) {
            return Err(ConfigError::InvalidCutoff(wn));
        }

        let n = order as f64;
        let prototype: Vec<Complex<f64>> = (0..order)
            .map(|i| {
                let m = -n + 1.0 + 2.0 * i as f64;
                -Complex::new(0.0, PI * m / (2.0 * n)).exp()
            })
            .collect();

        // Bilinear transform with fs = 2
        let fs = 2.0;
        let warped = 2.0 * fs * (PI * wn / fs).tan();

        let (zeros, poles, gain) = match kind {
            FilterKind::Lowpass => {
                let poles: Vec<_> = prototype.iter().map(|&p| p * warped).collect();
                (Vec::new(), poles, warped.powi(order as i32))
            }
            FilterKind::Highpass => {
                let poles: Vec<_> = prototype
                    .iter()
                    .map(|&p| Complex::new(warped, 0.0) / p)
                    .collect();
                let prod = prototype
                    .iter()
                    .fold(Complex::new(1.0, 0.0), |acc, &p| acc * -p);
                let gain = (Complex::new(1.0, 0.0) / prod).re;
                (vec![Complex::new(0.0, 0.0); order], poles, gain)
            }
        };

        let (zeros, poles, gain) = bilinear_zpk(&zeros, &poles, gain, fs);

        let b: Vec<f64> = poly(&zeros).iter().map(|c| c.re * gain).collect();
        let a: Vec<f64> = poly(&poles).iter().map(|c| c.re).collect();

        Ok(Self { b, a })
    }

    /// Filter order (number of delay states).
    pub fn order(&self) -> usize {
        self.a.len().max(self.b.len()) - 1
    }

    /// Minimum edge extension for zero-phase filtering.
    ///
    /// Inputs must be strictly longer than this.
    pub fn pad_len(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Causal filtering in direct form II transposed.
    pub fn apply(&self, x: &[f64], zi: Option<&[f64]>) -> Vec<f64> {
        let order = self.order();
        let mut state = vec![0.0; order];
        if let Some(zi) = zi {
            state.copy_from_slice(&zi[..order]);
        }

        let mut y = Vec::with_capacity(x.len());
        for &xn in x {
            let yn = self.b[0] * xn + state.first().copied().unwrap_or(0.0);
            for i in 0..order {
                let next = state.get(i + 1).copied().unwrap_or(0.0);
                state[i] = self.b[i + 1] * xn - self.a[i + 1] * yn + next;
            }
            y.push(yn);
        }

        y
    }

    /// Initial state for a unit-step steady state.
    ///
    /// Scaling this by the first input sample removes the startup transient.
    pub fn steady_state(&self) -> Vec<f64> {
        let order = self.order();
        let sum_b: f64 = self.b.iter().sum();
        let sum_a: f64 = self.a.iter().sum();
        let gain = sum_b / sum_a;

        let mut zi = vec![0.0; order];
        let mut acc = 0.0;
        for k in (0..order).rev() {
            acc += self.b[k + 1] - self.a[k + 1] * gain;
            zi[k] = acc;
        }

        zi
    }

    /// Zero-phase filtering: forward pass, backward pass, odd edge extension.
    ///
    /// Output has the same length as the input.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::SignalTooShort`] when the input is not longer than
    /// [`IirFilter::pad_len`].
    pub fn apply_zero_phase(&self, x: &[f64]) -> std::result::Result<Vec<f64>, DspError> {
        let padlen = self.pad_len();
        if x.len() <= padlen {
            return Err(DspError::SignalTooShort {
                len: x.len(),
                required: padlen,
            });
        }

        let ext = odd_extend(x, padlen);
        let zi = self.steady_state();

        let scaled: Vec<f64> = zi.iter().map(|z| z * ext[0]).collect();
        let mut y = self.apply(&ext, Some(&scaled));

        y.reverse();
        let scaled: Vec<f64> = zi.iter().map(|z| z * y[0]).collect();
        let mut y = self.apply(&y, Some(&scaled));
        y.reverse();

        Ok(y[padlen..padlen + x.len()].to_vec())
    }
}

/// Map analog zeros, poles and gain to the z-plane.
fn bilinear_zpk(
    zeros: &[Complex<f64>],
    poles: &[Complex<f64>],
    gain: f64,
    fs: f64,
) -> (Vec<Complex<f64>>, Vec<Complex<f64>>, f64) {
    let fs2 = Complex::new(2.0 * fs, 0.0);

    let mut z: Vec<_> = zeros.iter().map(|&z| (fs2 + z) / (fs2 - z)).collect();
    let p: Vec<_> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

    // Zeros at infinity land on Nyquist
    z.resize(p.len(), Complex::new(-1.0, 0.0));

    let num = zeros
        .iter()
        .fold(Complex::new(1.0, 0.0), |acc, &z| acc * (fs2 - z));
    let den = poles
        .iter()
        .fold(Complex::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));

    (z, p, gain * (num / den).re)
}

/// Expand polynomial coefficients (descending powers) from its roots.
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for root in roots {
        let mut next = coeffs.clone();
        next.push(Complex::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= *root * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

/// Odd extension of `x` by `n` samples at both ends.
fn odd_extend(x: &[f64], n: usize) -> Vec<f64> {
    let first = x[0];
    let last = x[x.len() - 1];

    let mut ext = Vec::with_capacity(x.len() + 2 * n);
    ext.extend((1..=n).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=n).map(|i| 2.0 * last - x[x.len() - 1 - i]));
    ext
}

/// Remove DC bias with a zero-phase DC blocker.
pub fn dc_block(x: &[f64], pole: f64) -> std::result::Result<Vec<f64>, DspError> {
    IirFilter::dc_block(pole).apply_zero_phase(x)
}

/// DC block followed by a zero-phase Butterworth high-pass.
///
/// # Arguments
///
/// * `x` - waveform at the working rate
/// * `fs` - working sample rate (Hz)
/// * `config` - supplies the DC pole, high-pass cutoff and filter order
pub fn preprocess(x: &[f64], fs: u32, config: &PipelineConfig) -> Result<Vec<f64>> {
    let x = dc_block(x, config.dc_block_coefficient)?;

    let wn = config.highpass_cutoff_hz / (fs as f64 / 2.0);
    let highpass = IirFilter::butterworth(config.filter_order, wn, FilterKind::Highpass)?;

    Ok(highpass.apply_zero_phase(&x)?)
}
