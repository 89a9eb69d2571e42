//! infrapsd: command line front end for the infrasound PSD feature pipeline.

pub mod cli;
pub mod config;
pub mod inspect;
pub mod process;
pub mod scan;
