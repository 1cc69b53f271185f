// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test model: suites, files and runs.
//!
//! A [`Suite`] is a set of test files. Each [`TestFile`] has an ordered list of [`Run`]s. The
//! configuration for each of these is loaded elsewhere and is immutable here: the runner only
//! updates statuses, diagnostics and verbose output.

use crate::{
    Status,
    addrs::Address,
    diagnostics::{Diagnostic, Diagnostics, Severity},
    engine::{ModuleConfig, Plan, ProviderConfig, State},
    errors::SuiteBuildError,
    variables::UnparsedVariables,
};
use infratest_metadata::{FileSummary, RunSummary, SuiteSummary};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// Whether a run only plans, or also applies.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TestCommand {
    /// Create a plan and evaluate assertions against the planned state.
    Plan,

    /// Create and apply a plan, and evaluate assertions against the new state.
    #[default]
    Apply,
}

/// The planning mode for a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TestMode {
    /// A normal plan.
    #[default]
    Normal,

    /// A refresh-only plan.
    RefreshOnly,
}

/// Planning options for a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOptions {
    /// The planning mode.
    pub mode: TestMode,

    /// Whether to refresh the state before planning.
    pub refresh: bool,

    /// Objects to target, as written in the test file.
    pub targets: Vec<String>,

    /// Resources to replace, as written in the test file.
    pub replace: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: TestMode::Normal,
            refresh: true,
            targets: Vec::new(),
            replace: Vec::new(),
        }
    }
}

/// Maps a provider defined in the test file into the module under test.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderMapping {
    /// The provider's key inside the module, e.g. `aws`.
    pub in_child: String,

    /// The provider's key in the test file, e.g. `aws.secondary`.
    pub in_parent: String,
}

/// An assertion declared on a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckRule {
    /// The condition, as written in the test file. Interpreted by the engine.
    pub condition: String,

    /// The objects the condition refers to, e.g. `aws_instance.web.id` or `var.region`.
    pub references: Vec<String>,
}

/// The configuration of a single run block.
#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    /// The name of the run. Unique within a file.
    pub name: String,

    /// Whether to plan or apply.
    pub command: TestCommand,

    /// Planning options.
    pub options: RunOptions,

    /// Checkable objects this run expects to fail.
    pub expect_failures: Vec<Address>,

    /// Variables set on this run.
    pub variables: UnparsedVariables,

    /// Provider mappings. If empty, every provider in the test file is used.
    pub providers: Vec<ProviderMapping>,

    /// The assertions of this run.
    pub check_rules: Vec<CheckRule>,

    /// A different module to execute instead of the main configuration. Its state is kept
    /// separately from the main state.
    pub config_under_test: Option<Arc<ModuleConfig>>,
}

impl RunConfig {
    /// Creates a run that applies the main configuration with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parses the `target` directives of this run.
    pub fn targets(&self) -> (Vec<Address>, Diagnostics) {
        parse_all(&self.options.targets, Address::parse_target, "Invalid target address")
    }

    /// Parses the `replace` directives of this run.
    pub fn replaces(&self) -> (Vec<Address>, Diagnostics) {
        parse_all(&self.options.replace, Address::parse_replace, "Invalid replace address")
    }

    /// Returns the objects referenced by the assertions of this run, without duplicates.
    pub fn references(&self) -> (Vec<Address>, Diagnostics) {
        let (references, diags) = parse_all(
            self.check_rules.iter().flat_map(|rule| &rule.references),
            Address::parse_reference,
            "Invalid reference",
        );
        let mut seen = BTreeSet::new();
        let references = references
            .into_iter()
            .filter(|address| seen.insert(address.clone()))
            .collect();
        (references, diags)
    }
}

fn parse_all<'a, F, E>(
    inputs: impl IntoIterator<Item = &'a String>,
    parse: F,
    summary: &str,
) -> (Vec<Address>, Diagnostics)
where
    F: Fn(&str) -> Result<Address, E>,
    E: fmt::Display,
{
    let mut addresses = Vec::new();
    let mut diags = Diagnostics::new();
    for input in inputs {
        match parse(input.as_str()) {
            Ok(address) => addresses.push(address),
            Err(error) => diags.push(Diagnostic::error(summary, error.to_string())),
        }
    }
    (addresses, diags)
}

/// The configuration of a single test file.
#[derive(Clone, Debug, Default)]
pub struct TestFileConfig {
    /// Variables set for every run in the file.
    pub variables: UnparsedVariables,

    /// Provider blocks declared by the file, keyed by `name` or `name.alias`.
    pub providers: BTreeMap<String, ProviderConfig>,

    /// The runs, in authored order.
    pub runs: Vec<Arc<RunConfig>>,
}

/// Identifies a run within a suite.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunIdentity {
    /// The file the run belongs to.
    pub file: String,

    /// The position of the run within its file.
    pub index: usize,

    /// The name of the run.
    pub name: String,
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.file, self.name)
    }
}

/// Extra information recorded for a run in verbose mode.
#[derive(Clone, Debug)]
pub struct Verbose {
    /// The plan the run created.
    pub plan: Option<Plan>,

    /// The state after the run.
    pub state: State,

    /// The configuration the run executed.
    pub config: Arc<ModuleConfig>,

    /// Provider schemas.
    pub providers: BTreeMap<String, serde_json::Value>,

    /// Provisioner schemas.
    pub provisioners: BTreeMap<String, serde_json::Value>,
}

/// A run and its outcome.
#[derive(Clone, Debug)]
pub struct Run {
    /// Identifies this run.
    pub id: RunIdentity,

    /// The configuration of this run.
    pub config: Arc<RunConfig>,

    /// The current status.
    pub status: Status,

    /// Diagnostics accumulated while executing the run.
    pub diagnostics: Diagnostics,

    /// Verbose output, if requested and available.
    pub verbose: Option<Box<Verbose>>,
}

impl Run {
    fn new(file: &str, index: usize, config: Arc<RunConfig>) -> Self {
        Self {
            id: RunIdentity {
                file: file.to_owned(),
                index,
                name: config.name.clone(),
            },
            config,
            status: Status::Pending,
            diagnostics: Diagnostics::new(),
            verbose: None,
        }
    }

    /// Reconciles engine diagnostics with the failures this run expects.
    ///
    /// An error from a check rule of an expected object is downgraded to a warning. Check blocks
    /// only ever report warnings, so any diagnostic from an expected check block counts. Each
    /// expectation that isn't met produces a "Missing expected failure" error.
    ///
    /// Only objects in the root module can be expected to fail.
    pub fn validate_expected_failures(&self, diags: Diagnostics) -> Diagnostics {
        let mut expected: BTreeMap<&Address, bool> = self
            .config
            .expect_failures
            .iter()
            .map(|address| (address, false))
            .collect();

        let mut out: Diagnostics = diags
            .into_iter()
            .map(|mut diag| {
                let Some(rule) = &diag.check_rule else {
                    return diag;
                };
                if !rule.container.is_in_root_module() {
                    return diag;
                }
                if !rule.is_check_block() && !diag.is_error() {
                    return diag;
                }
                let container = rule.container.without_instance_key();
                if let Some(seen) = expected.get_mut(&container) {
                    *seen = true;
                    diag.severity = Severity::Warning;
                }
                diag
            })
            .collect();

        for (address, seen) in expected {
            if !seen {
                out.push(
                    Diagnostic::error(
                        "Missing expected failure",
                        format!(
                            "The checkable object, {address}, was expected to report an error \
                             but did not."
                        ),
                    )
                    .with_address(address.clone()),
                );
            }
        }

        out
    }

    /// Returns a serializable summary of this run.
    pub fn to_summary(&self) -> RunSummary {
        RunSummary {
            name: self.id.name.clone(),
            index: self.id.index,
            status: self.status,
            diagnostics: self.diagnostics.to_summaries(),
        }
    }
}

/// A test file and its outcome.
#[derive(Clone, Debug)]
pub struct TestFile {
    /// The name of the file.
    pub name: String,

    /// The configuration of the file.
    pub config: Arc<TestFileConfig>,

    /// The runs, in authored order.
    pub runs: Vec<Run>,

    /// The aggregate status of the file.
    pub status: Status,
}

impl TestFile {
    /// Returns a serializable summary of this file.
    pub fn to_summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            status: self.status,
            runs: self.runs.iter().map(Run::to_summary).collect(),
        }
    }
}

/// A set of test files to execute.
#[derive(Clone, Debug, Default)]
pub struct Suite {
    /// The files, keyed by name. Files execute in key order.
    pub files: BTreeMap<String, TestFile>,

    /// The aggregate status of the suite.
    pub status: Status,

    /// Diagnostics produced while building the suite, e.g. for unknown filter entries.
    pub diagnostics: Diagnostics,
}

impl Suite {
    /// Returns the total number of runs across all files.
    pub fn run_count(&self) -> usize {
        self.files.values().map(|file| file.runs.len()).sum()
    }

    /// Returns a serializable summary of this suite.
    pub fn to_summary(&self) -> SuiteSummary {
        SuiteSummary {
            status: self.status,
            files: self.files.values().map(TestFile::to_summary).collect(),
        }
    }
}

/// Builds a [`Suite`] from loaded test files.
#[derive(Debug, Default)]
pub struct SuiteBuilder {
    files: BTreeMap<String, Arc<TestFileConfig>>,
    filter: Option<Vec<String>>,
}

impl SuiteBuilder {
    /// Creates a new builder over the given files.
    pub fn new(files: impl IntoIterator<Item = (String, Arc<TestFileConfig>)>) -> Self {
        Self {
            files: files.into_iter().collect(),
            filter: None,
        }
    }

    /// Restricts the suite to the named files.
    ///
    /// Names that don't match a file produce a warning on the suite, and are otherwise ignored.
    pub fn set_filter(
        &mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the suite.
    pub fn build(&self) -> Result<Suite, SuiteBuildError> {
        let mut suite = Suite::default();

        let selected: Vec<(&String, &Arc<TestFileConfig>)> = match &self.filter {
            Some(filter) => filter
                .iter()
                .filter_map(|name| match self.files.get_key_value(name) {
                    Some(entry) => Some(entry),
                    None => {
                        suite.diagnostics.push(Diagnostic::warning(
                            "Unknown test file",
                            format!("The specified test file, {name}, could not be found."),
                        ));
                        None
                    }
                })
                .collect(),
            None => self.files.iter().collect(),
        };

        for (name, config) in selected {
            let mut names = BTreeSet::new();
            for run in &config.runs {
                if !names.insert(run.name.as_str()) {
                    return Err(SuiteBuildError::DuplicateRunName {
                        file: name.clone(),
                        name: run.name.clone(),
                    });
                }
            }

            let runs = config
                .runs
                .iter()
                .enumerate()
                .map(|(index, run)| Run::new(name, index, run.clone()))
                .collect();
            suite.files.insert(
                name.clone(),
                TestFile {
                    name: name.clone(),
                    config: config.clone(),
                    runs,
                    status: Status::Pending,
                },
            );
        }

        tracing::debug!(
            files = suite.files.len(),
            runs = suite.run_count(),
            "built test suite"
        );
        Ok(suite)
    }
}
