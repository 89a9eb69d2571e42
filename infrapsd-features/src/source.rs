//! Waveform sources: the query seam between the pipeline and a time-series store.

use crate::config::{Credentials, SourceConfig};
use crate::error::SourceError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Time range query for one station/sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub station_id: String,
    pub sensor_id: String,
    pub credentials: Credentials,
}

impl FetchRequest {
    pub fn new(source: &SourceConfig, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            station_id: source.station_id.clone(),
            sensor_id: source.sensor_id.clone(),
            credentials: source.credentials.clone(),
        }
    }

    /// Key of the channel this request expects in the returned map.
    pub fn channel_key(&self) -> String {
        format!("{}_{}", self.station_id, self.sensor_id)
    }
}

/// Timestamped samples of one channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeSeries {
    pub times: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Channel key (`{station}_{sensor}`) to its samples.
pub type ChannelMap = HashMap<String, TimeSeries>;

/// Blocking time-range query against a waveform store.
///
/// Retries and timeouts are the implementation's concern. An empty map or a
/// map without the requested channel means "no data".
pub trait WaveformSource {
    fn fetch(&self, request: &FetchRequest) -> Result<ChannelMap, SourceError>;
}

impl<S: WaveformSource + ?Sized> WaveformSource for &S {
    fn fetch(&self, request: &FetchRequest) -> Result<ChannelMap, SourceError> {
        (**self).fetch(request)
    }
}

/// Pull the requested channel's values out of a fetch result.
///
/// # Errors
///
/// Returns [`SourceError::NoData`] when the channel is absent or empty.
pub fn channel_values(mut channels: ChannelMap, request: &FetchRequest) -> Result<Vec<f64>, SourceError> {
    let channel = request.channel_key();
    match channels.remove(&channel) {
        Some(series) if !series.is_empty() => Ok(series.values),
        _ => Err(SourceError::NoData {
            channel,
            start: request.start.to_rfc3339(),
            end: request.end.to_rfc3339(),
        }),
    }
}

/// In-memory source over one recorded, uniformly sampled channel.
///
/// Serves the samples whose timestamps fall in `[start, end)`, like a store
/// query over the same span would.
#[derive(Clone, Debug)]
pub struct RecordedSource {
    channel: String,
    start: DateTime<Utc>,
    fs: u32,
    samples: Vec<f64>,
}

impl RecordedSource {
    pub fn new(channel: impl Into<String>, start: DateTime<Utc>, fs: u32, samples: Vec<f64>) -> Self {
        Self {
            channel: channel.into(),
            start,
            fs,
            samples,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Timestamp just past the last sample.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.sample_offset(self.samples.len())
    }

    fn sample_offset(&self, index: usize) -> Duration {
        Duration::microseconds((index as i64 * 1_000_000) / self.fs.max(1) as i64)
    }

    /// Index of the first sample at or after `t`.
    fn index_at(&self, t: DateTime<Utc>) -> usize {
        let elapsed = (t - self.start).num_microseconds().unwrap_or(i64::MAX);
        if elapsed <= 0 {
            return 0;
        }
        let index = (elapsed as u128 * self.fs as u128).div_ceil(1_000_000);
        index.min(self.samples.len() as u128) as usize
    }
}

impl WaveformSource for RecordedSource {
    fn fetch(&self, request: &FetchRequest) -> Result<ChannelMap, SourceError> {
        let mut channels = ChannelMap::new();
        if request.channel_key() != self.channel || request.end <= request.start {
            return Ok(channels);
        }

        let from = self.index_at(request.start);
        let to = self.index_at(request.end);
        if from >= to {
            return Ok(channels);
        }

        let series = TimeSeries {
            times: (from..to).map(|i| self.start + self.sample_offset(i)).collect(),
            values: self.samples[from..to].to_vec(),
        };
        channels.insert(self.channel.clone(), series);
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn source() -> RecordedSource {
        let samples = (0..20 * 300).map(|i| i as f64).collect();
        RecordedSource::new("parost2_141929", t0(), 20, samples)
    }

    fn request(start_s: i64, end_s: i64) -> FetchRequest {
        let config = SourceConfig::new("parost2", "141929");
        FetchRequest::new(
            &config,
            t0() + Duration::seconds(start_s),
            t0() + Duration::seconds(end_s),
        )
    }

    #[test]
    fn serves_requested_span() {
        let request = request(60, 120);
        let values = channel_values(source().fetch(&request).unwrap(), &request).unwrap();

        assert_eq!(values.len(), 1200);
        assert_eq!(values[0], 1200.0);
        assert_eq!(values[1199], 2399.0);
    }

    #[test]
    fn clips_to_recording() {
        let request = request(270, 330);
        let values = channel_values(source().fetch(&request).unwrap(), &request).unwrap();

        assert_eq!(values.len(), 600);
    }

    #[test]
    fn span_outside_recording_has_no_data() {
        let request = request(400, 460);
        let result = channel_values(source().fetch(&request).unwrap(), &request);

        assert!(matches!(result, Err(SourceError::NoData { .. })));
    }

    #[test]
    fn other_channel_has_no_data() {
        let config = SourceConfig::new("parost2", "000000");
        let request = FetchRequest::new(&config, t0(), t0() + Duration::seconds(60));

        assert!(source().fetch(&request).unwrap().is_empty());
    }

    #[test]
    fn end_follows_sample_count() {
        assert_eq!(source().end(), t0() + Duration::seconds(300));
    }
}
