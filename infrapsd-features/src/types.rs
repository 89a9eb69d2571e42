//! Core types for infrapsd-features

use crate::window::parse_window_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Band-limited Welch PSD of one window.
///
/// `power[i]` is the density at `frequency[i]`; both vectors always have the
/// same length and every frequency is at or below the estimator cutoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PsdWindow {
    /// Power spectral density (units²/Hz)
    pub power: Vec<f64>,
    /// Bin frequencies in Hz
    pub frequency: Vec<f64>,
}

impl PsdWindow {
    pub fn len(&self) -> usize {
        self.power.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }
}

/// Catalog information for an earthquake event.
///
/// Numeric catalog columns may be missing, so only the origin time and
/// location are required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Origin time
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Hypocenter depth in km
    #[serde(default)]
    pub depth: Option<f64>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    /// Magnitude scale, lowercased (`ml`, `mw`, ...)
    #[serde(default)]
    pub magtype: Option<String>,
    /// Predicted surface wave arrival at the station
    #[serde(default)]
    pub arrival_time: Option<DateTime<Utc>>,
}

/// PSD windows of one accepted event.
///
/// Serializes as a flat map: an optional `metadata` entry next to
/// `window_001`, `window_002`, ... entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    #[serde(flatten)]
    pub windows: BTreeMap<String, PsdWindow>,
}

impl EventRecord {
    pub fn new(metadata: Option<EventMetadata>) -> Self {
        Self {
            metadata,
            windows: BTreeMap::new(),
        }
    }

    pub fn num_windows(&self) -> usize {
        self.windows.len()
    }

    /// Windows in ordinal order, ignoring keys that are not `window_NNN`.
    ///
    /// Ordinals are compared numerically so `window_1000` sorts after
    /// `window_999`.
    pub fn ordered_windows(&self) -> Vec<(usize, &PsdWindow)> {
        let mut windows: Vec<_> = self
            .windows
            .iter()
            .filter_map(|(key, psd)| parse_window_key(key).map(|ordinal| (ordinal, psd)))
            .collect();
        windows.sort_by_key(|(ordinal, _)| *ordinal);
        windows
    }
}

/// Archive key for the `n`th accepted event: `event_001`, `event_002`, ...
pub fn event_key(ordinal: usize) -> String {
    format!("event_{ordinal:03}")
}
