// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out test events.
//!
//! The main structure in this module is [`TestReporter`].

use super::{
    displayer::{DisplayReporter, DisplayReporterBuilder},
    events::TestEvent,
    structured::JsonReporter,
};
use crate::{config::ReporterFormat, errors::WriteEventError};
use std::io::{self, Write};

/// Destination for the reporter.
///
/// This is usually standard output, but can be an in-memory buffer for tests.
pub enum ReporterOutput<'a> {
    /// Write to standard output.
    Stdout,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    format: ReporterFormat,
    should_colorize: bool,
    verbose: bool,
}

impl TestReporterBuilder {
    /// Sets the output format.
    pub fn set_format(&mut self, format: ReporterFormat) -> &mut Self {
        self.format = format;
        self
    }

    /// Set to true if the reporter should colorize output. Ignored for JSON output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: the plan or state of each run that executed.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new test reporter.
    pub fn build<'a>(&self, output: ReporterOutput<'a>) -> TestReporter<'a> {
        let inner = match self.format {
            ReporterFormat::Human => ReporterImpl::Display(
                DisplayReporterBuilder {
                    should_colorize: self.should_colorize,
                    verbose: self.verbose,
                }
                .build(),
            ),
            ReporterFormat::Json => ReporterImpl::Json(JsonReporter),
        };
        TestReporter { inner, output }
    }
}

#[derive(Debug)]
enum ReporterImpl {
    Display(DisplayReporter),
    Json(JsonReporter),
}

/// Functionality to report test results to standard output, or to an in-memory buffer.
pub struct TestReporter<'a> {
    inner: ReporterImpl,
    output: ReporterOutput<'a>,
}

impl TestReporter<'_> {
    /// Report a test event.
    pub fn report_event(&mut self, event: &TestEvent) -> Result<(), WriteEventError> {
        match &mut self.output {
            ReporterOutput::Stdout => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                Self::write_event(&self.inner, event, &mut lock)?;
                lock.flush()?;
            }
            ReporterOutput::Buffer(buf) => {
                Self::write_event(&self.inner, event, &mut **buf)?;
            }
        }
        Ok(())
    }

    fn write_event(
        inner: &ReporterImpl,
        event: &TestEvent,
        writer: &mut dyn Write,
    ) -> Result<(), WriteEventError> {
        match inner {
            ReporterImpl::Display(display) => display.write_event(event, writer)?,
            ReporterImpl::Json(json) => json.write_event(event, writer)?,
        }
        Ok(())
    }
}
