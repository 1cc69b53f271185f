// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for infratest.
//!
//! Configuration is layered, lowest priority first:
//!
//! 1. the default config embedded in the binary
//! 2. `.config/infratest.toml` in the working directory, or an explicitly provided file
//! 3. environment variables of the form `INFRATEST_<SECTION>__<KEY>`, for example
//!    `INFRATEST_RUNNER__CANCEL_GRACE_PERIOD=10s`

use crate::errors::{ConfigParseError, ConfigParseErrorKind, ReporterFormatParseError};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{fmt, str::FromStr, time::Duration};

/// Overall configuration for infratest.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    config_file: Utf8PathBuf,
    inner: RunnerConfigImpl,
}

impl RunnerConfig {
    /// The default location of the config within a directory: `.config/infratest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/infratest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Environment configuration uses this prefix, plus a _.
    pub const ENVIRONMENT_PREFIX: &'static str = "INFRATEST";

    /// Reads the config from the given file, or if not specified from `.config/infratest.toml`
    /// under `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/infratest.toml`, uses the
    /// default config options, still layered with environment overrides.
    pub fn from_sources(
        root: impl AsRef<Utf8Path>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(root.as_ref(), config_file, Self::environment())
    }

    // `INFRATEST_RUNNER__CANCEL_GRACE_PERIOD` maps to `runner.cancel-grace-period`. The prefix is
    // joined with a single underscore, while sections and keys are split on a double one.
    fn environment() -> Environment {
        Environment::with_prefix(Self::ENVIRONMENT_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn from_sources_impl(
        root: &Utf8Path,
        config_file: Option<&Utf8Path>,
        environment: Environment,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config()
            .add_source(source)
            .add_source(environment);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        tracing::debug!(%config_file, ?inner, "loaded infratest config");
        Ok(Self { config_file, inner })
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let inner = config
            .try_deserialize()
            .expect("default config is always valid");
        Self {
            config_file: Utf8PathBuf::from(Self::CONFIG_PATH),
            inner,
        }
    }

    /// Returns the path of the repository config file, whether or not it exists.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns true if runs should produce verbose output.
    pub fn verbose(&self) -> bool {
        self.inner.runner.verbose
    }

    /// Returns how long to wait for in-flight work after a second interrupt.
    pub fn cancel_grace_period(&self) -> Duration {
        self.inner.runner.cancel_grace_period
    }

    /// Returns the output format for the reporter.
    pub fn reporter_format(&self) -> ReporterFormat {
        self.inner.reporter.format
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<RunnerConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|err| ConfigParseErrorKind::BuildError(Box::new(err)))?;

        serde_path_to_error::deserialize(config)
            .map_err(|err| ConfigParseErrorKind::DeserializeError(Box::new(err)))
    }
}

/// The output format for the reporter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReporterFormat {
    /// Human-readable output.
    #[default]
    Human,

    /// One JSON object per event.
    Json,
}

impl ReporterFormat {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["human", "json"]
    }
}

impl fmt::Display for ReporterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ReporterFormat {
    type Err = ReporterFormatParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(ReporterFormatParseError::new(other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerConfigImpl {
    runner: RunnerSection,
    reporter: ReporterSection,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunnerSection {
    verbose: bool,
    // Environment overrides can't contain dashes, so accept the underscore form too.
    #[serde(
        with = "humantime_serde",
        alias = "cancel_grace_period",
        default = "default_cancel_grace_period"
    )]
    cancel_grace_period: Duration,
}

fn default_cancel_grace_period() -> Duration {
    Duration::from_secs(5)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReporterSection {
    format: ReporterFormat,
}
