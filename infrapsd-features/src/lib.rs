//! infrapsd-features: deterministic infrasound PSD features for earthquake detection.
//!
//! This crate turns infrasound sensor waveforms into fixed-shape Welch PSD
//! features. The same numerics serve dataset construction and live inference,
//! so a model trained on batch output sees identically computed inputs.
//!
//! # Architecture
//!
//! A waveform flows through these stages:
//!
//! - [`resample`]: DC block, zero-phase anti-alias low-pass, polyphase resampling
//! - [`filter`]: DC block and zero-phase high-pass at the working rate
//! - [`window`]: near-complete padding, overlapping windows, window count gates
//! - [`spectral`]: band-limited Welch PSD per window
//! - [`features`]: log compression and z-score normalization
//!
//! Two drivers run the stages:
//!
//! - [`batch::BatchProcessor`]: raw event archive to PSD archive, per-event skip/error accounting
//! - [`live::LivePipeline`]: latest or back-to-back segments from a [`source::WaveformSource`]
//!
//! # Quick Start
//!
//! ```ignore
//! use infrapsd_features::archive::EventArchive;
//! use infrapsd_features::batch::{BatchProcessor, EventKind};
//! use infrapsd_features::config::PipelineConfig;
//!
//! let archive = EventArchive::load("EarthQuakeEvents.json")?;
//! let processor = BatchProcessor::new(PipelineConfig::default(), EventKind::Earthquake, "parost2_141929")?;
//!
//! let report = processor.run(&archive);
//! println!("{} events accepted", report.accepted);
//! ```

pub mod archive;
pub mod arrival;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod filter;
pub mod live;
pub mod resample;
pub mod source;
pub mod spectral;
pub mod types;
pub mod window;

pub use error::{Error, PipelineError, Result};
