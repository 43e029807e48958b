//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliBackend};
use crate::config::{BackendType, GarmentConfig, UntrainedPolicy};
use anyhow::{Context, Result};
use tracing::debug;

/// Convert CLI arguments to a validated `GarmentConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply the flags that were given
    pub(crate) fn from_cli(cli: &Cli) -> Result<GarmentConfig> {
        let mut config = match &cli.config {
            Some(path) => GarmentConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
            None => GarmentConfig::default(),
        };

        if cli.no_learned {
            config.learned.enabled = false;
        }
        if cli.accept_untrained {
            config.learned.untrained_policy = UntrainedPolicy::Accept;
        }
        if let Some(backend) = cli.backend {
            config.learned.backend = match backend {
                CliBackend::Native => BackendType::Native,
                CliBackend::Tract => BackendType::Tract,
            };
        }
        if let Some(weights) = &cli.weights {
            config.learned.weights_path = Some(weights.clone());
        }
        if let Some(digest) = &cli.weights_sha256 {
            config.learned.weights_sha256 = Some(digest.to_ascii_lowercase());
        }
        if let Some(quality) = cli.quality {
            config.color.quality = quality;
        }
        if let Some(palette_size) = cli.palette_size {
            config.color.palette_size = palette_size;
        }

        config.validate().context("Invalid configuration")?;
        debug!(?config, "Resolved configuration");
        Ok(config)
    }
}
