//! Waveform windowing: padding policy, overlapping windows and count gates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Zero-padding policy for near-complete waveforms.
///
/// Waveforms within `[low_threshold, target)` samples are padded at the end
/// to exactly `target`. Shorter waveforms indicate real data loss and are
/// left alone for the caller to reject.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadPolicy {
    pub low_threshold: usize,
    pub target: usize,
}

/// What [`PadPolicy::apply`] did to a waveform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadOutcome {
    /// Zeros appended to reach the target
    Padded { added: usize },
    /// Already at or above the target
    Unchanged,
    /// Too short to pad; the waveform was not modified
    BelowThreshold,
}

impl PadPolicy {
    pub fn new(low_threshold: usize, target: usize) -> Self {
        Self {
            low_threshold,
            target,
        }
    }

    /// Classify a waveform length without touching the data.
    pub fn outcome(&self, len: usize) -> PadOutcome {
        if len >= self.target {
            PadOutcome::Unchanged
        } else if len >= self.low_threshold {
            PadOutcome::Padded {
                added: self.target - len,
            }
        } else {
            PadOutcome::BelowThreshold
        }
    }

    /// Zero-pad `waveform` in place when it is near-complete.
    pub fn apply(&self, waveform: &mut Vec<f64>) -> PadOutcome {
        let outcome = self.outcome(waveform.len());
        if let PadOutcome::Padded { .. } = outcome {
            waveform.resize(self.target, 0.0);
        }
        outcome
    }
}

/// Fixed-length window geometry in working-rate samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    /// Samples per window
    pub len: usize,
    /// Samples between consecutive window starts
    pub stride: usize,
}

impl WindowConfig {
    pub fn new(len: usize, stride: usize) -> Self {
        Self { len, stride }
    }

    /// Number of full windows that fit in `total` samples.
    ///
    /// `(total - len) / stride + 1` when `total >= len`, else zero.
    pub fn window_count(&self, total: usize) -> usize {
        if total < self.len || self.stride == 0 {
            return 0;
        }
        (total - self.len) / self.stride + 1
    }

    /// Create an iterator over window ranges for a given total size.
    ///
    /// Returns an iterator of `(ordinal, Range<usize>)` where the ordinal is
    /// 1-based and ranges start at `(ordinal - 1) * stride`.
    pub fn iter_ranges(&self, total: usize) -> WindowRangeIter {
        WindowRangeIter {
            remaining: self.window_count(total),
            len: self.len,
            stride: self.stride,
            ordinal: 0,
        }
    }

    /// Iterate over the windows of `data` in increasing start order.
    pub fn iter_windows<'a>(self, data: &'a [f64]) -> impl Iterator<Item = Window<'a>> + 'a {
        self.iter_ranges(data.len())
            .map(move |(ordinal, range)| Window {
                ordinal,
                start: range.start,
                samples: &data[range],
            })
    }
}

/// Iterator over window ranges with 1-based ordinals.
pub struct WindowRangeIter {
    remaining: usize,
    len: usize,
    stride: usize,
    ordinal: usize,
}

impl Iterator for WindowRangeIter {
    type Item = (usize, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let start = self.ordinal * self.stride;
        self.ordinal += 1;
        self.remaining -= 1;

        Some((self.ordinal, start..start + self.len))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for WindowRangeIter {}

/// One window of a waveform.
#[derive(Clone, Copy, Debug)]
pub struct Window<'a> {
    /// 1-based position in the waveform
    pub ordinal: usize,
    /// Offset of the first sample
    pub start: usize,
    pub samples: &'a [f64],
}

impl Window<'_> {
    /// Archive key for this window.
    pub fn key(&self) -> String {
        window_key(self.ordinal)
    }
}

/// Archive key for a window ordinal: `window_001`, `window_002`, ...
pub fn window_key(ordinal: usize) -> String {
    format!("window_{ordinal:03}")
}

/// Parse the ordinal back out of a `window_NNN` key.
pub fn parse_window_key(key: &str) -> Option<usize> {
    key.strip_prefix("window_")?.parse().ok()
}

/// Window count acceptance rule.
///
/// Batch dataset construction tolerates extra windows; live inference needs
/// the exact feature shape the model was trained on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowGate {
    AtLeast(usize),
    Exactly(usize),
}

impl WindowGate {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            WindowGate::AtLeast(n) => count >= n,
            WindowGate::Exactly(n) => count == n,
        }
    }
}

impl fmt::Display for WindowGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowGate::AtLeast(n) => write!(f, "at least {n}"),
            WindowGate::Exactly(n) => write!(f, "exactly {n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: WindowConfig = WindowConfig {
        len: 1000,
        stride: 500,
    };

    #[test]
    fn count_matches_formula() {
        for total in [1000, 1499, 1500, 5999, 6000, 6001, 6500, 12345] {
            assert_eq!(CANONICAL.window_count(total), (total - 1000) / 500 + 1);
        }
    }

    #[test]
    fn short_waveform_has_no_windows() {
        assert_eq!(CANONICAL.window_count(999), 0);
        assert_eq!(CANONICAL.iter_ranges(999).count(), 0);
    }

    #[test]
    fn windows_are_ordered_with_fixed_stride() {
        let data = vec![0.0; 7250];
        let windows: Vec<_> = CANONICAL.iter_windows(&data).collect();

        assert_eq!(windows.len(), CANONICAL.window_count(data.len()));
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.ordinal, i + 1);
            assert_eq!(w.start, i * 500);
            assert_eq!(w.samples.len(), 1000);
        }
    }

    #[test]
    fn windows_slice_the_right_samples() {
        let data: Vec<f64> = (0..2000).map(|i| i as f64).collect();
        let windows: Vec<_> = CANONICAL.iter_windows(&data).collect();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].samples[0], 500.0);
        assert_eq!(windows[2].samples[999], 1999.0);
    }

    #[test]
    fn pads_near_complete_waveform() {
        let policy = PadPolicy::new(5700, 6000);
        let mut waveform = vec![1.0; 5700];

        assert_eq!(policy.apply(&mut waveform), PadOutcome::Padded { added: 300 });
        assert_eq!(waveform.len(), 6000);
        assert!(waveform[5700..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn padding_is_idempotent() {
        let policy = PadPolicy::new(5700, 6000);
        let mut waveform = vec![1.0; 5850];

        policy.apply(&mut waveform);
        let once = waveform.clone();
        assert_eq!(policy.apply(&mut waveform), PadOutcome::Unchanged);
        assert_eq!(waveform, once);
    }

    #[test]
    fn leaves_complete_waveform_alone() {
        let policy = PadPolicy::new(5700, 6000);
        let mut waveform = vec![1.0; 6400];

        assert_eq!(policy.apply(&mut waveform), PadOutcome::Unchanged);
        assert_eq!(waveform.len(), 6400);
    }

    #[test]
    fn never_pads_below_threshold() {
        let policy = PadPolicy::new(5700, 6000);
        let mut waveform = vec![1.0; 5699];

        assert_eq!(policy.apply(&mut waveform), PadOutcome::BelowThreshold);
        assert_eq!(waveform.len(), 5699);
    }

    #[test]
    fn padded_canonical_waveform_yields_eleven_windows() {
        let policy = PadPolicy::new(5700, 6000);
        let mut waveform = vec![1.0; 5700];
        policy.apply(&mut waveform);

        let starts: Vec<usize> = CANONICAL.iter_windows(&waveform).map(|w| w.start).collect();

        assert_eq!(starts, (0..11).map(|i| i * 500).collect::<Vec<_>>());
    }

    #[test]
    fn window_keys_round_trip() {
        assert_eq!(window_key(1), "window_001");
        assert_eq!(window_key(11), "window_011");
        assert_eq!(parse_window_key("window_011"), Some(11));
        assert_eq!(parse_window_key("metadata"), None);
    }

    #[test]
    fn gates() {
        assert!(WindowGate::AtLeast(11).accepts(12));
        assert!(!WindowGate::AtLeast(11).accepts(10));
        assert!(WindowGate::Exactly(11).accepts(11));
        assert!(!WindowGate::Exactly(11).accepts(12));
        assert_eq!(WindowGate::Exactly(11).to_string(), "exactly 11");
    }
}
