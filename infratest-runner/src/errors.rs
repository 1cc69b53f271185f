// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by infratest.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse infratest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the underlying error kind.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<config::ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<config::ConfigError>>),
}

/// An error that occurred while parsing an address.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("invalid address `{input}`: {reason}")]
pub struct AddressParseError {
    input: String,
    reason: String,
}

impl AddressParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns a description of what was wrong with the input.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// An error that occurred while building a [`Suite`](crate::suite::Suite).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum SuiteBuildError {
    /// Two runs in the same file have the same name.
    #[error("in test file `{file}`, run name `{name}` is used more than once")]
    DuplicateRunName {
        /// The file containing the runs.
        file: String,

        /// The repeated name.
        name: String,
    },
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

impl SignalHandlerSetupError {
    pub(crate) fn new(err: std::io::Error) -> Self {
        Self(err)
    }
}

/// An error that occurred while building the test runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),
}

/// Errors that occurred while executing a suite.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerExecuteError<E> {
    /// The suite task panicked.
    #[error("the suite task panicked")]
    SuiteTaskPanicked(#[source] tokio::task::JoinError),

    /// The callback returned an error.
    #[error("error reporting an event")]
    ReportError(#[source] E),
}

/// An error that occurs while writing an event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[from] std::io::Error),

    /// An error occurred while serializing an event to JSON.
    #[error("error serializing event as JSON")]
    Json(#[source] serde_json::Error),
}

/// An error returned while parsing a [`ReporterFormat`](crate::config::ReporterFormat) from a
/// string.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for reporter format: {input}\n(known values: human, json)")]
pub struct ReporterFormatParseError {
    input: String,
}

impl ReporterFormatParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error returned while parsing a [`Color`](crate::output::Color) from a string.
#[derive(Clone, Debug, Error)]
pub struct ColorParseError {
    input: String,
}

impl ColorParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

impl fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized value for color: {}\n(known values: auto, always, never)",
            self.input
        )
    }
}
