// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output.

use super::events::{TestEvent, TestEventKind};
use crate::{
    Status,
    diagnostics::{Diagnostic, Diagnostics, Severity},
    engine::{ChangeAction, ResourceChange, State},
    suite::{Run, RunIdentity, TestCommand, TestFile},
};
use infratest_metadata::SuiteSummary;
use itertools::Itertools;
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

#[derive(Debug, Default)]
pub(super) struct DisplayReporterBuilder {
    pub(super) should_colorize: bool,
    pub(super) verbose: bool,
}

impl DisplayReporterBuilder {
    pub(super) fn build(self) -> DisplayReporter {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }
        DisplayReporter {
            styles,
            verbose: self.verbose,
        }
    }
}

/// Renders events as text for a terminal.
#[derive(Debug)]
pub(super) struct DisplayReporter {
    styles: Styles,
    verbose: bool,
}

impl DisplayReporter {
    pub(super) fn write_event(&self, event: &TestEvent, writer: &mut dyn Write) -> io::Result<()> {
        match &event.kind {
            TestEventKind::SuiteStarted { summary } => {
                let run_count: usize = summary.files.iter().map(|file| file.runs.len()).sum();
                writeln!(
                    writer,
                    "{:>12} {} {} across {} {}",
                    "Starting".style(self.styles.pass),
                    run_count.style(self.styles.count),
                    plural(run_count, "run", "runs"),
                    summary.files.len().style(self.styles.count),
                    plural(summary.files.len(), "file", "files"),
                )?;
            }
            TestEventKind::SuiteDiagnostics { diagnostics } => {
                self.write_diagnostics(diagnostics, writer)?;
            }
            TestEventKind::RunDiagnostics { run, diagnostics } => {
                if !diagnostics.is_empty() {
                    writeln!(writer, "{}:", run.style(self.styles.run_id))?;
                    self.write_diagnostics(diagnostics, writer)?;
                }
            }
            TestEventKind::FileFinished { file } => {
                self.write_file(file, writer)?;
            }
            TestEventKind::RunFinished { run } => {
                self.write_run(run, writer)?;
            }
            TestEventKind::Interrupted => {
                writeln!(writer)?;
                writeln!(writer, "{}", "Interrupt received.".style(self.styles.skip))?;
                writeln!(
                    writer,
                    "Please wait for infratest to exit or data loss may occur.\n\
                     Gracefully shutting down..."
                )?;
            }
            TestEventKind::FatalInterrupt => {
                writeln!(writer)?;
                writeln!(
                    writer,
                    "{} Exiting immediately. Note that data loss may have occurred.",
                    "Two interrupts received.".style(self.styles.fail),
                )?;
            }
            TestEventKind::FatalInterruptSummary {
                file,
                run,
                module,
                states,
                created,
            } => {
                let diags = fatal_interrupt_diagnostics(
                    file,
                    run.as_ref(),
                    module.as_deref(),
                    states,
                    created,
                );
                self.write_diagnostics(&diags, writer)?;
            }
            TestEventKind::DestroySummary {
                file,
                run,
                state,
                diagnostics,
            } => {
                self.write_destroy_summary(file, run.as_ref(), state, diagnostics, writer)?;
            }
            TestEventKind::SuiteFinished { summary } => {
                self.write_conclusion(summary, writer)?;
            }
        }

        Ok(())
    }

    fn write_file(&self, file: &TestFile, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(
            writer,
            "{}... {}",
            file.name.style(self.styles.file_name),
            self.status_str(file.status),
        )
    }

    fn write_run(&self, run: &Run, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(
            writer,
            "  run \"{}\"... {}",
            run.id.name.style(self.styles.run_id),
            self.status_str(run.status),
        )?;

        if self.verbose
            && matches!(run.status, Status::Pass | Status::Fail)
            && let Some(verbose) = &run.verbose
        {
            match (run.config.command, &verbose.plan) {
                (TestCommand::Plan, Some(plan)) => {
                    if plan.is_empty() {
                        writeln!(writer, "    No changes.")?;
                    }
                    for change in plan
                        .changes
                        .iter()
                        .filter(|change| change.action != ChangeAction::NoOp)
                    {
                        writeln!(
                            writer,
                            "    {} {}",
                            change.address.style(self.styles.address),
                            format!("({})", change.action).style(self.styles.count),
                        )?;
                    }
                }
                _ => {
                    if verbose.state.is_empty() {
                        writeln!(writer, "    The state is empty.")?;
                    }
                    for address in verbose.state.addresses() {
                        writeln!(writer, "    {}", address.style(self.styles.address))?;
                    }
                }
            }
        }

        self.write_diagnostics(&run.diagnostics, writer)
    }

    fn write_destroy_summary(
        &self,
        file: &str,
        run: Option<&RunIdentity>,
        state: &State,
        diagnostics: &Diagnostics,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let identifier = match run {
            Some(run) => run.to_string(),
            None => file.to_owned(),
        };

        if diagnostics.has_errors() {
            writeln!(
                writer,
                "infratest encountered an error destroying resources created while executing {}.",
                identifier.style(self.styles.run_id),
            )?;
        }
        self.write_diagnostics(diagnostics, writer)?;

        if !state.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "infratest left the following resources in state after executing {}, \
                 and they need to be cleaned up manually:",
                identifier.style(self.styles.run_id),
            )?;
            for address in state.addresses() {
                writeln!(writer, "  - {}", address.style(self.styles.address))?;
            }
        }

        Ok(())
    }

    fn write_conclusion(&self, summary: &SuiteSummary, writer: &mut dyn Write) -> io::Result<()> {
        let counts = summary.run_counts();
        writeln!(writer)?;

        if counts.passed + counts.failed + counts.errored == 0 {
            write!(writer, "Executed 0 runs")?;
        } else {
            if summary.status == Status::Pass {
                write!(writer, "{}", "Success!".style(self.styles.pass))?;
            } else {
                write!(writer, "{}", "Failure!".style(self.styles.fail))?;
            }
            write!(
                writer,
                " {} passed, {} failed",
                counts.passed.style(self.styles.count),
                (counts.failed + counts.errored).style(self.styles.count),
            )?;
        }

        if counts.skipped > 0 {
            writeln!(
                writer,
                ", {} skipped.",
                counts.skipped.style(self.styles.count)
            )
        } else {
            writeln!(writer, ".")
        }
    }

    fn write_diagnostics(&self, diagnostics: &Diagnostics, writer: &mut dyn Write) -> io::Result<()> {
        for diag in diagnostics {
            self.write_diagnostic(diag, writer)?;
        }
        Ok(())
    }

    fn write_diagnostic(&self, diag: &Diagnostic, writer: &mut dyn Write) -> io::Result<()> {
        let style = match diag.severity {
            Severity::Error => self.styles.fail,
            Severity::Warning => self.styles.skip,
        };
        writeln!(writer)?;
        write!(
            writer,
            "{}: {}",
            diag.severity.style(style),
            diag.summary.style(self.styles.summary),
        )?;
        if let Some(address) = &diag.address {
            write!(writer, " ({})", address.style(self.styles.address))?;
        }
        writeln!(writer)?;
        if let Some(detail) = &diag.detail {
            writeln!(writer)?;
            for line in detail.lines() {
                if line.is_empty() {
                    writeln!(writer)?;
                } else {
                    writeln!(writer, "  {line}")?;
                }
            }
        }
        writeln!(writer)
    }

    fn status_str(&self, status: Status) -> owo_colors::Styled<&'static str> {
        let style = match status {
            Status::Pass => self.styles.pass,
            Status::Fail | Status::Error => self.styles.fail,
            Status::Skip => self.styles.skip,
            Status::Pending => self.styles.count,
        };
        style.style(status.to_static_str())
    }
}

/// Builds the diagnostics explaining what a hard cancel may have left behind.
pub(super) fn fatal_interrupt_diagnostics(
    file: &str,
    run: Option<&RunIdentity>,
    module: Option<&str>,
    states: &[(Option<RunIdentity>, State)],
    created: &[ResourceChange],
) -> Diagnostics {
    let mut diags = Diagnostics::new();

    for (owner, state) in states {
        if state.is_empty() {
            continue;
        }
        let resources = state.addresses().sorted().join("\n  - ");
        let detail = match owner {
            None => format!(
                "infratest was interrupted while executing {file}, and may not have performed \
                 the expected cleanup operations. infratest has left the following resources in \
                 state:\n  - {resources}"
            ),
            Some(owner) => format!(
                "infratest was interrupted while executing {file}, and may not have performed \
                 the expected cleanup operations. infratest has left the following resources in \
                 state created by \"{}\":\n  - {resources}",
                owner.name
            ),
        };
        diags.push(Diagnostic::error(
            "infratest was interrupted while executing the test file, and may have left \
             infrastructure behind",
            detail,
        ));
    }

    if !created.is_empty() {
        let resources = created.iter().map(|change| &change.address).join("\n  - ");
        let module = match module {
            Some(source) => format!("\"{source}\""),
            None => "the main configuration".to_owned(),
        };
        let run_name = run.map_or("cleanup", |run| run.name.as_str());
        diags.push(Diagnostic::error(
            "infratest was in the process of creating resources when interrupted",
            format!(
                "infratest was interrupted while executing {file}, and may not have performed \
                 the expected cleanup operations. infratest was in the process of creating the \
                 following resources for \"{run_name}\" from {module}, and they may not have \
                 been destroyed:\n  - {resources}"
            ),
        ));
    }

    diags
}

fn plural(count: usize, singular: &'static str, plural: &'static str) -> &'static str {
    if count == 1 { singular } else { plural }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    file_name: Style,
    run_id: Style,
    address: Style,
    summary: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.file_name = Style::new().bold();
        self.run_id = Style::new().blue().bold();
        self.address = Style::new().cyan();
        self.summary = Style::new().bold();
    }
}
