// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::Status;
use serde::{Deserialize, Serialize};

/// A serializable summary of a suite run.
///
/// This is the root of the JSON emitted for the suite conclusion.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteSummary {
    /// The aggregate status of the suite.
    pub status: Status,

    /// The files in the suite, in execution order.
    pub files: Vec<FileSummary>,
}

impl SuiteSummary {
    /// Returns per-status counts over every run in the suite.
    pub fn run_counts(&self) -> RunCounts {
        let mut counts = RunCounts::default();
        for run in self.files.iter().flat_map(|file| &file.runs) {
            counts.add(run.status);
        }
        counts
    }

    /// Parses a summary from JSON.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

/// A serializable summary of a single test file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSummary {
    /// The name of the file.
    pub name: String,

    /// The aggregate status of the file.
    pub status: Status,

    /// The runs within the file, in authored order.
    pub runs: Vec<RunSummary>,
}

/// A serializable summary of a single run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The name of the run.
    pub name: String,

    /// The index of the run within its file.
    pub index: usize,

    /// The final status of the run.
    pub status: Status,

    /// Diagnostics accumulated while executing the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<DiagnosticSummary>,
}

/// A serializable diagnostic.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiagnosticSummary {
    /// The severity of the diagnostic.
    pub severity: SeveritySummary,

    /// A short summary.
    pub summary: String,

    /// A longer description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The address of the object the diagnostic is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// The severity of a [`DiagnosticSummary`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeveritySummary {
    /// A warning.
    Warning,

    /// An error.
    Error,
}

/// Per-status counts of runs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunCounts {
    /// The number of runs that passed.
    pub passed: usize,

    /// The number of runs that failed.
    pub failed: usize,

    /// The number of runs that errored.
    pub errored: usize,

    /// The number of runs that were skipped.
    pub skipped: usize,

    /// The number of runs that never started.
    pub pending: usize,
}

impl RunCounts {
    fn add(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::Pass => self.passed += 1,
            Status::Skip => self.skipped += 1,
            Status::Fail => self.failed += 1,
            Status::Error => self.errored += 1,
        }
    }

    /// The total number of runs counted.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored + self.skipped + self.pending
    }
}
