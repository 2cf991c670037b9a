// Copyright (c) The go-sentinel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunConfig, WatchConfig, WatchMode};
use crate::errors::ConfigParseError;
use camino::Utf8Path;
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;

/// Overall configuration for sentinel.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SentinelConfig {
    /// Watch mode settings.
    pub watch: WatchConfig,

    /// Per-run settings.
    pub run: RunConfig,
}

impl SentinelConfig {
    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Environment configuration uses this prefix, plus a `_`.
    pub const ENVIRONMENT_PREFIX: &'static str = "SENTINEL";

    /// Reads the config from the default config, then `config_file` if specified, then the
    /// environment.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        Self::read(config_file, Self::environment())
    }

    /// Reads the config from the default config layered with a TOML string.
    ///
    /// The environment is not consulted.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigParseError> {
        Self::make_default_config()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(None, err))
    }

    pub(crate) fn read(
        config_file: Option<&Utf8Path>,
        environment: Environment,
    ) -> Result<Self, ConfigParseError> {
        let mut builder = Self::make_default_config();
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::new(config_file.as_str(), FileFormat::Toml));
        }
        let config = builder
            .add_source(environment)
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|err| ConfigParseError::new(config_file.map(|path| path.to_owned()), err))?;

        tracing::debug!(
            config_file = config_file.map(|path| path.as_str()),
            debounce = ?config.watch.debounce,
            mode = %config.watch.mode,
            "loaded sentinel config",
        );
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix(Self::ENVIRONMENT_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }
}

/// The same values as [`SentinelConfig::DEFAULT_CONFIG`].
impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig {
                debounce: Duration::from_millis(300),
                mode: WatchMode::Changed,
                run_on_start: true,
            },
            run: RunConfig {
                progress_interval: Duration::from_millis(100),
                source_context_lines: 2,
            },
        }
    }
}
