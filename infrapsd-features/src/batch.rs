//! Batch driver: turn an archive of raw events into PSD records.

use crate::archive::{EventArchive, PsdArchive, RawEvent};
use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::filter::preprocess;
use crate::resample::resample;
use crate::spectral::WelchEstimator;
use crate::types::{EventRecord, event_key};
use std::fmt;

/// Kind of recording being processed.
///
/// Earthquake records carry catalog metadata into their output; background
/// records have none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Earthquake,
    Background,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Earthquake => write!(f, "earthquake"),
            EventKind::Background => write!(f, "background"),
        }
    }
}

/// Terminal state of one event.
#[derive(Debug)]
pub enum EventOutcome {
    Accepted(EventRecord),
    /// Failed a validity gate (too short, too few windows)
    Skipped(PipelineError),
    /// Malformed record or processing fault
    Errored(PipelineError),
}

impl From<Result<EventRecord, PipelineError>> for EventOutcome {
    fn from(result: Result<EventRecord, PipelineError>) -> Self {
        match result {
            Ok(record) => EventOutcome::Accepted(record),
            Err(e) if e.is_skip() => EventOutcome::Skipped(e),
            Err(e) => EventOutcome::Errored(e),
        }
    }
}

/// Event that did not make it into the output.
#[derive(Debug)]
pub struct Rejection {
    pub event: String,
    pub error: PipelineError,
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Accepted events keyed `event_001`, `event_002`, ... in archive order
    pub results: PsdArchive,
    pub accepted: usize,
    pub skipped: usize,
    pub errored: usize,
    pub rejections: Vec<Rejection>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.accepted + self.skipped + self.errored
    }
}

/// Sequential per-event PSD extraction.
///
/// Each event runs resample, length check, preprocess, pad, window count
/// check and a PSD per window. A failing event is logged and counted; it
/// never stops the run.
#[derive(Debug)]
pub struct BatchProcessor {
    config: PipelineConfig,
    kind: EventKind,
    channel: String,
    welch: WelchEstimator,
}

impl BatchProcessor {
    /// Create a processor reading `channel` from every event.
    pub fn new(
        config: PipelineConfig,
        kind: EventKind,
        channel: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let welch = WelchEstimator::from_config(&config)?;

        Ok(Self {
            config,
            kind,
            channel: channel.into(),
            welch,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Run one event through the pipeline.
    pub fn process_event(&self, name: &str, event: &RawEvent) -> EventOutcome {
        let outcome = EventOutcome::from(self.extract(event));
        if let EventOutcome::Accepted(record) = &outcome {
            tracing::debug!(event = name, windows = record.num_windows(), "event accepted");
        }
        outcome
    }

    fn extract(&self, event: &RawEvent) -> Result<EventRecord, PipelineError> {
        let config = &self.config;

        let samples = event.samples(&self.channel)?;
        if samples.is_empty() {
            return Err(PipelineError::MalformedRecord(format!(
                "channel {} has no samples",
                self.channel
            )));
        }

        let metadata = match self.kind {
            EventKind::Earthquake => Some(
                event
                    .metadata
                    .clone()
                    .ok_or_else(|| PipelineError::MalformedRecord("missing metadata".into()))?,
            ),
            EventKind::Background => None,
        };

        let x = resample(&samples, config.fs_in, config.fs_out, config)?;

        let window_len = config.window_len();
        if x.len() < window_len {
            return Err(PipelineError::InsufficientSamples {
                len: x.len(),
                required: window_len,
            });
        }

        let mut x = preprocess(&x, config.fs_out, config)?;
        config.pad_policy().apply(&mut x);

        let windows = config.window_config();
        let found = windows.window_count(x.len());
        let gate = config.batch_gate();
        if !gate.accepts(found) {
            return Err(PipelineError::WindowCountMismatch { found, gate });
        }

        let mut record = EventRecord::new(metadata);
        for window in windows.iter_windows(&x) {
            let psd = self.welch.estimate(window.samples)?;
            record.windows.insert(window.key(), psd);
        }

        Ok(record)
    }

    /// Process every event of `archive` in order.
    pub fn run(&self, archive: &EventArchive) -> BatchReport {
        let mut report = BatchReport::default();

        for (name, event) in archive.iter() {
            let outcome = match event {
                Ok(event) => self.process_event(name, &event),
                Err(e) => EventOutcome::Errored(PipelineError::MalformedRecord(e.to_string())),
            };

            match outcome {
                EventOutcome::Accepted(record) => {
                    report.accepted += 1;
                    report.results.insert(event_key(report.accepted), record);
                }
                EventOutcome::Skipped(error) => {
                    tracing::warn!(event = name, reason = %error, "skipping event");
                    report.skipped += 1;
                    report.rejections.push(Rejection {
                        event: name.to_string(),
                        error,
                    });
                }
                EventOutcome::Errored(error) => {
                    tracing::warn!(event = name, error = %error, "error processing event");
                    report.errored += 1;
                    report.rejections.push(Rejection {
                        event: name.to_string(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            kind = %self.kind,
            accepted = report.accepted,
            skipped = report.skipped,
            errored = report.errored,
            "batch complete"
        );

        report
    }
}
