// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    diagnostics::Diagnostics,
    engine::{ResourceChange, State},
    suite::{Run, RunIdentity, TestFile},
};
use chrono::{DateTime, FixedOffset};
use infratest_metadata::SuiteSummary;
use std::time::Duration;

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`TestReporter`](crate::reporter::TestReporter).
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the suite.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The suite is about to start.
    SuiteStarted {
        /// The files and runs that will execute. Every status is pending.
        summary: SuiteSummary,
    },

    /// Diagnostics produced while building the suite.
    SuiteDiagnostics {
        /// The diagnostics.
        diagnostics: Diagnostics,
    },

    /// Diagnostics for a run that was cancelled, and so won't be reported through
    /// [`RunFinished`](Self::RunFinished).
    RunDiagnostics {
        /// The run.
        run: RunIdentity,

        /// The diagnostics accumulated by the run.
        diagnostics: Diagnostics,
    },

    /// Every run in a file has finished. Followed by one
    /// [`RunFinished`](Self::RunFinished) per run.
    FileFinished {
        /// The file, including its runs.
        file: TestFile,
    },

    /// The report for a single run, sent after its file finished.
    RunFinished {
        /// The run, including its status, diagnostics and verbose output.
        run: Run,
    },

    /// The first interrupt was received: remaining runs are skipped, and cleanup still happens.
    Interrupted,

    /// The second interrupt was received: in-flight work is abandoned.
    FatalInterrupt,

    /// What may have been left behind by a hard cancel.
    FatalInterruptSummary {
        /// The file that was executing.
        file: String,

        /// The run that was executing, or `None` if the file's cleanup was executing.
        run: Option<RunIdentity>,

        /// The source of the module the run was executing, if it wasn't the main configuration.
        module: Option<String>,

        /// Every state the file was tracking. `None` identifies the main state.
        states: Vec<(Option<RunIdentity>, State)>,

        /// Resources the interrupted apply planned to create.
        created: Vec<ResourceChange>,
    },

    /// The result of destroying one of a file's states.
    DestroySummary {
        /// The file whose state was destroyed.
        file: String,

        /// The run that created the state, or `None` for the main state.
        run: Option<RunIdentity>,

        /// The state after destroying. Anything left here needs manual cleanup.
        state: State,

        /// Diagnostics produced while destroying.
        diagnostics: Diagnostics,
    },

    /// The suite finished. Not sent if the suite was cancelled.
    SuiteFinished {
        /// The final statuses.
        summary: SuiteSummary,
    },
}

impl TestEventKind {
    /// Returns a short kebab-case name for this kind of event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SuiteStarted { .. } => "suite-started",
            Self::SuiteDiagnostics { .. } => "suite-diagnostics",
            Self::RunDiagnostics { .. } => "run-diagnostics",
            Self::FileFinished { .. } => "file-finished",
            Self::RunFinished { .. } => "run-finished",
            Self::Interrupted => "interrupted",
            Self::FatalInterrupt => "fatal-interrupt",
            Self::FatalInterruptSummary { .. } => "fatal-interrupt-summary",
            Self::DestroySummary { .. } => "destroy-summary",
            Self::SuiteFinished { .. } => "suite-finished",
        }
    }
}
