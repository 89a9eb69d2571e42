//! Event archives: raw waveform input and PSD output, both JSON.
//!
//! Raw archives map an event name to its recorded channels and optional
//! catalog metadata. Entry order is kept as written so accepted events are
//! numbered in archive order. PSD archives map `event_NNN` keys to
//! [`EventRecord`]s.

use crate::error::{ArchiveError, FeatureError, PipelineError};
use crate::types::{EventMetadata, EventRecord};
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Key wrapping PSD results in archives exported by older tooling
const PSD_RESULTS_KEY: &str = "psdResults";

/// Raw recording of one event or background interval.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Channel key to rows of `[timestamp, ..., value]`
    pub waveform: BTreeMap<String, Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    /// Segment start for background intervals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl RawEvent {
    /// Build an event from a bare sample series, one `[index, value]` row per sample.
    pub fn from_samples(channel: impl Into<String>, samples: &[f64]) -> Self {
        let rows = samples
            .iter()
            .enumerate()
            .map(|(i, &v)| vec![i as f64, v])
            .collect();
        Self {
            waveform: BTreeMap::from([(channel.into(), rows)]),
            metadata: None,
            timestamp: None,
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sample values of `channel`: the last column of each row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedRecord`] when the channel is missing
    /// or any row is empty.
    pub fn samples(&self, channel: &str) -> Result<Vec<f64>, PipelineError> {
        let rows = self
            .waveform
            .get(channel)
            .ok_or_else(|| PipelineError::MalformedRecord(format!("missing channel {channel}")))?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                row.last().copied().ok_or_else(|| {
                    PipelineError::MalformedRecord(format!("channel {channel} row {i} is empty"))
                })
            })
            .collect()
    }
}

/// Ordered raw event archive.
///
/// Entries are decoded lazily so a single malformed event does not make the
/// whole archive unreadable.
#[derive(Clone, Debug, Default)]
pub struct EventArchive {
    entries: Map<String, Value>,
}

impl EventArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an archive from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let entries: Map<String, Value> = read_json(path)?;
        Ok(Self { entries })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        write_json(path.as_ref(), &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an event, replacing any existing entry with the same name.
    pub fn insert(&mut self, name: impl Into<String>, event: &RawEvent) -> serde_json::Result<()> {
        self.entries.insert(name.into(), serde_json::to_value(event)?);
        Ok(())
    }

    /// Events in archive order, each decoded on demand.
    pub fn iter(&self) -> impl Iterator<Item = (&str, serde_json::Result<RawEvent>)> + '_ {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), RawEvent::deserialize(value)))
    }
}

/// PSD results keyed by `event_NNN`.
pub type PsdArchive = BTreeMap<String, EventRecord>;

/// Read a PSD archive, unwrapping a top-level `psdResults` entry if present.
pub fn load_psd_archive(path: impl AsRef<Path>) -> Result<PsdArchive, ArchiveError> {
    let path = path.as_ref();
    let mut value: Value = read_json(path)?;

    if let Some(inner) = value.get_mut(PSD_RESULTS_KEY) {
        value = inner.take();
    }

    serde_json::from_value(value).map_err(|source| ArchiveError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write a PSD archive with events in run order.
///
/// `event_NNN` entries are written by ordinal so `event_1000` follows
/// `event_999`; any other keys come last.
pub fn save_psd_archive(path: impl AsRef<Path>, archive: &PsdArchive) -> Result<(), ArchiveError> {
    let path = path.as_ref();

    let mut entries: Vec<_> = archive.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        let rank = |key: &str| event_ordinal(key).unwrap_or(usize::MAX);
        rank(a).cmp(&rank(b)).then_with(|| a.cmp(b))
    });

    let mut ordered = Map::new();
    for (key, record) in entries {
        let value = serde_json::to_value(record).map_err(|source| ArchiveError::Json {
            path: path.display().to_string(),
            source,
        })?;
        ordered.insert(key.clone(), value);
    }

    write_json(path, &ordered)
}

/// Ordinal of an `event_NNN` key.
fn event_ordinal(key: &str) -> Option<usize> {
    key.strip_prefix("event_")?.parse().ok()
}

/// Stack archive power spectra into an `(events, windows, bins)` tensor.
///
/// Only `event_*` entries are used, in numeric order. Each event contributes
/// its first `num_windows` windows by ordinal; events with fewer windows are
/// dropped. An archive with no qualifying events yields an empty tensor.
///
/// # Errors
///
/// Returns [`FeatureError::RaggedWindows`] when events disagree on bin count.
pub fn extract_psd_array(archive: &PsdArchive, num_windows: usize) -> Result<Array3<f64>, FeatureError> {
    let mut events: Vec<(usize, &EventRecord)> = archive
        .iter()
        .filter_map(|(key, record)| Some((event_ordinal(key)?, record)))
        .collect();
    events.sort_by_key(|(ordinal, _)| *ordinal);

    let mut stacked: Vec<Array2<f64>> = Vec::new();
    for (_, record) in events {
        let windows = record.ordered_windows();
        if windows.len() < num_windows {
            continue;
        }
        let psds: Vec<_> = windows
            .into_iter()
            .take(num_windows)
            .map(|(_, psd)| psd.clone())
            .collect();
        stacked.push(crate::features::stack_windows(&psds)?);
    }

    let Some(first) = stacked.first() else {
        return Ok(Array3::zeros((0, num_windows, 0)));
    };
    let bins = first.ncols();
    if let Some(i) = stacked.iter().position(|m| m.ncols() != bins) {
        return Err(FeatureError::RaggedWindows {
            ordinal: i + 1,
            found: stacked[i].ncols(),
            expected: bins,
        });
    }

    let views: Vec<_> = stacked.iter().map(|m| m.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ArchiveError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArchiveError> {
    let file = File::create(path).map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::to_writer(BufWriter::new(file), value).map_err(|source| ArchiveError::Json {
        path: path.display().to_string(),
        source,
    })
}
