//! Live and range drivers: fixed-length segments to model-ready feature vectors.

use crate::classifier::{Classifier, Prediction};
use crate::config::{PipelineConfig, SourceConfig};
use crate::error::{Error, FeatureError, PipelineError, Result};
use crate::features::{FeatureVector, NormStats, assemble};
use crate::filter::preprocess;
use crate::resample::resample;
use crate::source::{FetchRequest, WaveformSource, channel_values};
use crate::spectral::WelchEstimator;
use chrono::{DateTime, Duration, DurationRound, Utc};

/// Segment-to-feature transform shared by the live and range drivers.
///
/// Holds read-only configuration, normalization statistics and the Welch
/// estimator; [`process`](Self::process) has no side effects.
#[derive(Debug)]
pub struct SegmentProcessor {
    config: PipelineConfig,
    stats: Option<NormStats>,
    welch: WelchEstimator,
}

impl SegmentProcessor {
    /// Create a processor.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, or statistics whose length differs from
    /// the feature length the config produces.
    pub fn new(config: PipelineConfig, stats: Option<NormStats>) -> Result<Self> {
        config.validate()?;
        let welch = WelchEstimator::from_config(&config)?;

        let processor = Self {
            config,
            stats,
            welch,
        };

        if let Some(stats) = &processor.stats {
            let features = processor.feature_len();
            if stats.len() != features {
                return Err(Error::Feature(FeatureError::LengthMismatch {
                    features,
                    stats: stats.len(),
                }));
            }
        }

        Ok(processor)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Length of every produced vector: required windows × retained bins.
    pub fn feature_len(&self) -> usize {
        self.config.required_windows_live * self.welch.freq_bins()
    }

    /// Turn one segment of input-rate samples into a feature vector.
    ///
    /// Order: resample, preprocess, pad, require `pad_target` samples,
    /// require exactly `required_windows_live` windows, PSD per window,
    /// assemble.
    pub fn process(&self, samples: &[f64]) -> std::result::Result<FeatureVector, PipelineError> {
        let config = &self.config;

        let x = resample(samples, config.fs_in, config.fs_out, config)?;
        let mut x = preprocess(&x, config.fs_out, config)?;

        let policy = config.pad_policy();
        policy.apply(&mut x);
        if x.len() < policy.target {
            return Err(PipelineError::InsufficientSamples {
                len: x.len(),
                required: policy.target,
            });
        }

        let windows = config.window_config();
        let found = windows.window_count(x.len());
        let gate = config.live_gate();
        if !gate.accepts(found) {
            return Err(PipelineError::WindowCountMismatch { found, gate });
        }

        let psds = windows
            .iter_windows(&x)
            .map(|window| self.welch.estimate(window.samples))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(assemble(&psds, self.stats.as_ref())?)
    }
}

/// Feature vector of one range increment.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeFeature {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub features: FeatureVector,
}

/// Classifier decision for one range increment.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub prediction: Prediction,
}

/// Pulls segments from a waveform source and featurizes them.
pub struct LivePipeline<S> {
    source: S,
    target: SourceConfig,
    processor: SegmentProcessor,
}

impl<S: WaveformSource> LivePipeline<S> {
    pub fn new(source: S, target: SourceConfig, processor: SegmentProcessor) -> Self {
        Self {
            source,
            target,
            processor,
        }
    }

    pub fn processor(&self) -> &SegmentProcessor {
        &self.processor
    }

    fn segment_duration(&self) -> Duration {
        Duration::seconds(self.processor.config.segment_duration_s as i64)
    }

    /// Fetch and featurize `[start, end]`.
    pub fn segment(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<FeatureVector, PipelineError> {
        let request = FetchRequest::new(&self.target, start, end);
        let channels = self.source.fetch(&request)?;
        let samples = channel_values(channels, &request)?;
        self.processor.process(&samples)
    }

    /// Feature vector for the segment ending at `now`, truncated to the second.
    ///
    /// Any failure is logged and reported as `None`.
    pub fn latest(&self, now: DateTime<Utc>) -> Option<FeatureVector> {
        let end = now.duration_trunc(Duration::seconds(1)).unwrap_or(now);
        let start = end - self.segment_duration();

        tracing::debug!(%start, %end, "querying latest segment");

        match self.segment(start, end) {
            Ok(features) => Some(features),
            Err(e) => {
                tracing::warn!(%start, %end, reason = %e, "latest segment unavailable");
                None
            }
        }
    }

    /// Feature vectors for back-to-back segments covering `[start, end]`.
    ///
    /// Increments run while `t + segment <= end`; a trailing partial
    /// increment is not queried. Failed increments are logged and left out,
    /// so the output may have gaps.
    pub fn range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RangeFeature> {
        let step = self.segment_duration();
        let mut results = Vec::new();
        let mut t = start;

        while t + step <= end {
            let (seg_start, seg_end) = (t, t + step);
            t = seg_end;

            match self.segment(seg_start, seg_end) {
                Ok(features) => {
                    tracing::debug!(start = %seg_start, "segment featurized");
                    results.push(RangeFeature {
                        start: seg_start,
                        end: seg_end,
                        features,
                    });
                }
                Err(e) => {
                    tracing::warn!(start = %seg_start, end = %seg_end, reason = %e, "skipping segment");
                }
            }
        }

        tracing::info!(segments = results.len(), %start, %end, "range complete");
        results
    }

    /// Classify every segment [`range`](Self::range) produces.
    ///
    /// # Errors
    ///
    /// Classifier failures abort the scan.
    pub fn classify_range<C: Classifier + ?Sized>(
        &self,
        classifier: &mut C,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Detection>> {
        self.range(start, end)
            .into_iter()
            .map(|segment| {
                let prediction = classifier.predict(&segment.features)?;
                tracing::debug!(
                    start = %segment.start,
                    label = %prediction.label,
                    confidence = prediction.confidence(),
                    "segment classified"
                );
                Ok(Detection {
                    start: segment.start,
                    end: segment.end,
                    prediction,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use crate::error::{ConfigError, SourceError};
    use crate::features::log_compress;
    use crate::source::{ChannelMap, RecordedSource};
    use chrono::TimeZone;
    use ndarray::Array1;
    use std::f64::consts::PI;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / 20.0;
                (2.0 * PI * 1.5 * t).sin() + 0.4 * (2.0 * PI * 6.0 * t).cos() + 0.01 * t
            })
            .collect()
    }

    fn processor() -> SegmentProcessor {
        SegmentProcessor::new(PipelineConfig::default(), None).unwrap()
    }

    fn pipeline(seconds: usize) -> LivePipeline<RecordedSource> {
        let source = RecordedSource::new("parost2_141929", t0(), 20, signal(20 * seconds));
        LivePipeline::new(source, SourceConfig::new("parost2", "141929"), processor())
    }

    struct FailingSource;

    impl WaveformSource for FailingSource {
        fn fetch(&self, _: &FetchRequest) -> std::result::Result<ChannelMap, SourceError> {
            Err(SourceError::Query("connection refused".into()))
        }
    }

    /// Calls it an earthquake when the mean feature is above a threshold.
    struct MeanThreshold(f32);

    impl Classifier for MeanThreshold {
        fn predict(&mut self, features: &FeatureVector) -> Result<Prediction> {
            let mean = features.mean().unwrap_or(0.0);
            let logits = if mean > self.0 { [1.0, 0.0] } else { [0.0, 1.0] };
            Ok(Prediction::from_logits(logits))
        }
    }

    #[test]
    fn full_minute_yields_fixed_length_vector() {
        let features = processor().process(&signal(1200)).unwrap();

        assert_eq!(features.len(), 11 * 52);
        assert!(features.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn near_complete_minute_is_padded() {
        let features = processor().process(&signal(1140)).unwrap();

        assert_eq!(features.len(), 572);
    }

    #[test]
    fn short_segment_is_rejected_after_padding() {
        let result = processor().process(&signal(1139));

        assert!(matches!(
            result,
            Err(PipelineError::InsufficientSamples {
                len: 5695,
                required: 6000
            })
        ));
    }

    #[test]
    fn extra_windows_are_rejected() {
        let result = processor().process(&signal(1300));

        assert!(matches!(
            result,
            Err(PipelineError::WindowCountMismatch { found: 12, .. })
        ));
    }

    #[test]
    fn window_count_must_match_exactly() {
        let config = PipelineConfig {
            required_windows_live: 10,
            ..Default::default()
        };
        let processor = SegmentProcessor::new(config, None).unwrap();

        assert!(matches!(
            processor.process(&signal(1200)),
            Err(PipelineError::WindowCountMismatch { found: 11, .. })
        ));
    }

    #[test]
    fn vector_is_deterministic() {
        let processor = processor();
        let x = signal(1200);

        assert_eq!(processor.process(&x).unwrap(), processor.process(&x).unwrap());
    }

    #[test]
    fn stats_are_applied() {
        let raw = processor().process(&signal(1200)).unwrap();
        let stats = NormStats::new(raw.mapv(f64::from), Array1::from_elem(572, 1.0)).unwrap();
        let processor = SegmentProcessor::new(PipelineConfig::default(), Some(stats)).unwrap();

        let z = processor.process(&signal(1200)).unwrap();

        assert!(z.iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn zero_length_segments_are_rejected_up_front() {
        let config = PipelineConfig {
            segment_duration_s: 0,
            ..Default::default()
        };

        assert!(matches!(
            SegmentProcessor::new(config, None),
            Err(Error::Config(ConfigError::InvalidLength { .. }))
        ));
    }

    #[test]
    fn rejects_stats_of_wrong_length() {
        let stats = NormStats::new(Array1::zeros(10), Array1::ones(10)).unwrap();

        assert!(SegmentProcessor::new(PipelineConfig::default(), Some(stats)).is_err());
    }

    #[test]
    fn unnormalized_vector_is_log_power() {
        let config = PipelineConfig::default();
        let x = resample(&signal(1200), 20, 100, &config).unwrap();
        let x = preprocess(&x, 100, &config).unwrap();
        let welch = WelchEstimator::from_config(&config).unwrap();
        let psds: Vec<_> = config
            .window_config()
            .iter_windows(&x)
            .map(|w| welch.estimate(w.samples).unwrap())
            .collect();
        let expected = log_compress(&psds).unwrap().mapv(|v| v as f32);

        assert_eq!(processor().process(&signal(1200)).unwrap(), expected);
    }

    #[test]
    fn latest_returns_vector_for_available_minute() {
        let pipeline = pipeline(300);
        let now = t0() + Duration::seconds(200) + Duration::milliseconds(750);

        let features = pipeline.latest(now).unwrap();

        assert_eq!(features.len(), 572);
    }

    #[test]
    fn latest_is_none_without_data() {
        let pipeline = pipeline(300);

        assert!(pipeline.latest(t0() + Duration::seconds(1000)).is_none());
    }

    #[test]
    fn latest_is_none_on_fetch_failure() {
        let pipeline = LivePipeline::new(
            FailingSource,
            SourceConfig::new("parost2", "141929"),
            processor(),
        );

        assert!(pipeline.latest(t0()).is_none());
        assert!(matches!(
            pipeline.segment(t0(), t0() + Duration::seconds(60)),
            Err(PipelineError::FetchUnavailable(_))
        ));
    }

    #[test]
    fn range_steps_in_whole_segments() {
        let pipeline = pipeline(300);

        let segments = pipeline.range(t0(), t0() + Duration::seconds(330));

        assert_eq!(segments.len(), 5);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.start, t0() + Duration::seconds(60 * i as i64));
            assert_eq!(segment.end - segment.start, Duration::seconds(60));
            assert_eq!(segment.features.len(), 572);
        }
    }

    #[test]
    fn range_skips_unavailable_segments() {
        let pipeline = pipeline(300);

        let segments = pipeline.range(t0() + Duration::seconds(180), t0() + Duration::seconds(420));

        let starts: Vec<_> = segments.iter().map(|s| s.start).collect();
        assert_eq!(
            starts,
            vec![t0() + Duration::seconds(180), t0() + Duration::seconds(240)]
        );
    }

    #[test]
    fn range_shorter_than_one_segment_is_empty() {
        let pipeline = pipeline(300);

        assert!(pipeline.range(t0(), t0() + Duration::seconds(59)).is_empty());
    }

    #[test]
    fn classify_range_labels_each_segment() {
        let pipeline = pipeline(180);

        let detections = pipeline
            .classify_range(&mut MeanThreshold(f32::MIN), t0(), t0() + Duration::seconds(180))
            .unwrap();

        assert_eq!(detections.len(), 3);
        assert!(detections.iter().all(|d| d.prediction.label == Label::Earthquake));
    }
}
