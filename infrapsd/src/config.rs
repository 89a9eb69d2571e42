//! Configuration types for resolved CLI arguments.
//!
//! Args structs (for CLI parsing) live in cli.rs and the subcommand modules;
//! this module resolves the shared ones.

use crate::cli::{ChannelArgs, PipelineArgs};
use eyre::{Result, WrapErr};
use infrapsd_features::config::{PipelineConfig, SourceConfig};

impl TryFrom<PipelineArgs> for PipelineConfig {
    type Error = eyre::Error;

    fn try_from(args: PipelineArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => PipelineConfig::load(path)
                .wrap_err_with(|| format!("failed to load config: {:?}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(fs_in) = args.fs_in {
            config.fs_in = fs_in;
        }
        if let Some(fs_out) = args.fs_out {
            config.fs_out = fs_out;
        }

        config.validate().wrap_err("invalid pipeline configuration")?;
        Ok(config)
    }
}

impl From<ChannelArgs> for SourceConfig {
    fn from(args: ChannelArgs) -> Self {
        SourceConfig::new(args.station, args.sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_overrides() {
        let config = PipelineConfig::try_from(PipelineArgs::default()).unwrap();

        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = PipelineArgs {
            fs_in: Some(50),
            ..Default::default()
        };

        let config = PipelineConfig::try_from(args).unwrap();

        assert_eq!(config.fs_in, 50);
        assert_eq!(config.fs_out, 100);
    }

    #[test]
    fn rejects_zero_rate() {
        let args = PipelineArgs {
            fs_out: Some(0),
            ..Default::default()
        };

        assert!(PipelineConfig::try_from(args).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = PipelineArgs {
            config: Some("/nonexistent/infrapsd.json".into()),
            ..Default::default()
        };

        assert!(PipelineConfig::try_from(args).is_err());
    }

    #[test]
    fn channel_args_build_source() {
        let source = SourceConfig::from(ChannelArgs {
            station: "parost2".into(),
            sensor: "141929".into(),
        });

        assert_eq!(source.channel_key(), "parost2_141929");
    }
}
