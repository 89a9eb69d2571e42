//! Inspect subcommand - stack a PSD archive into a dataset tensor.

use color_eyre::Section;
use eyre::{Context, Result, eyre};
use infrapsd_features::archive::{extract_psd_array, load_psd_archive};
use infrapsd_features::features::{LOG_EPSILON, NormStats};
use ndarray::Array3;
use std::path::PathBuf;

/// CLI arguments for PSD archive inspection.
#[derive(clap::Args, Debug)]
pub struct Args {
    /// PSD archive produced by `process`
    pub input: PathBuf,

    /// Windows kept per event; events with fewer are dropped
    #[arg(long, default_value_t = 11)]
    pub windows: usize,

    /// Fit normalization statistics on the stacked events and write them here
    #[arg(long)]
    pub stats_out: Option<PathBuf>,
}

/// Resolved configuration for inspection.
#[derive(Debug)]
pub struct Config {
    pub input: PathBuf,
    pub windows: usize,
    pub stats_out: Option<PathBuf>,
}

impl TryFrom<Args> for Config {
    type Error = eyre::Error;

    fn try_from(args: Args) -> Result<Self> {
        if args.windows == 0 {
            return Err(eyre!("window count must be positive")).suggestion("pass --windows 11");
        }

        Ok(Self {
            input: args.input,
            windows: args.windows,
            stats_out: args.stats_out,
        })
    }
}

pub fn execute(config: Config) -> Result<()> {
    let archive = load_psd_archive(&config.input)
        .wrap_err_with(|| format!("failed to load psd archive: {:?}", config.input.display()))?;

    let tensor = extract_psd_array(&archive, config.windows)?;
    let (events, windows, bins) = tensor.dim();

    tracing::info!(
        input = ?config.input.display(),
        records = archive.len(),
        events,
        windows,
        bins,
        "stacked psd archive"
    );

    println!("{events} events x {windows} windows x {bins} bins");

    if let Some(path) = config.stats_out.as_deref() {
        let stats = fit_stats(&tensor)
            .wrap_err("failed to fit normalization statistics")
            .suggestion("the archive needs at least one event with enough windows")?;
        stats.save(path)?;

        tracing::info!(path = ?path.display(), features = stats.len(), "write normalization stats");
    }

    Ok(())
}

/// Fit statistics over events flattened to `windows * bins` log-power rows.
fn fit_stats(tensor: &Array3<f64>) -> Result<NormStats> {
    let (events, windows, bins) = tensor.dim();
    if events == 0 {
        return Err(eyre!("no events to fit"));
    }

    let rows = tensor
        .to_shape((events, windows * bins))?
        .mapv(|x| (x + LOG_EPSILON).log10());

    Ok(NormStats::fit(rows.view())?)
}
