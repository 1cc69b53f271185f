// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diagnostics produced while executing runs.
//!
//! Diagnostics are data, not Rust errors: they accumulate on runs and destroy summaries and are
//! rendered by the reporter. A diagnostic can optionally carry the check rule it originated from,
//! which is how expected failures are matched and how check-block warnings are recognized.

use crate::addrs::{Address, AddressKind};
use infratest_metadata::{DiagnosticSummary, SeveritySummary};
use std::fmt;

/// The severity of a [`Diagnostic`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// A warning. Warnings never change the status of a run.
    Warning,

    /// An error.
    Error,
}

impl Severity {
    /// Returns a lowercase string for this severity.
    pub fn to_static_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// The check rule a diagnostic originated from.
///
/// Check rules are the preconditions, postconditions, validations and check-block assertions
/// attached to checkable objects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckRuleOrigin {
    /// The address of the checkable object that contains the rule.
    pub container: Address,

    /// The index of the rule within its container.
    pub index: usize,
}

impl CheckRuleOrigin {
    /// Returns true if the rule belongs to a check block.
    pub fn is_check_block(&self) -> bool {
        self.container.kind() == AddressKind::Check
    }
}

/// A single diagnostic.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    /// The severity.
    pub severity: Severity,

    /// A short summary.
    pub summary: String,

    /// A longer description, if any.
    pub detail: Option<String>,

    /// The object this diagnostic is about, if any.
    pub address: Option<Address>,

    /// The check rule this diagnostic originated from, if any.
    pub check_rule: Option<CheckRuleOrigin>,
}

impl Diagnostic {
    /// Creates a new error diagnostic with no source information.
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::sourceless(Severity::Error, summary, detail)
    }

    /// Creates a new warning diagnostic with no source information.
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::sourceless(Severity::Warning, summary, detail)
    }

    fn sourceless(severity: Severity, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            severity,
            summary: summary.into(),
            detail: (!detail.is_empty()).then_some(detail),
            address: None,
            check_rule: None,
        }
    }

    /// Attaches an address to this diagnostic.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Marks this diagnostic as originating from the given check rule.
    pub fn with_check_rule(mut self, container: Address, index: usize) -> Self {
        self.check_rule = Some(CheckRuleOrigin { container, index });
        self
    }

    /// Returns true if this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Returns true if this diagnostic came from a check block's rule.
    pub fn originates_from_check_block(&self) -> bool {
        self.check_rule
            .as_ref()
            .is_some_and(CheckRuleOrigin::is_check_block)
    }

    /// Returns a serializable summary of this diagnostic.
    pub fn to_summary(&self) -> DiagnosticSummary {
        DiagnosticSummary {
            severity: match self.severity {
                Severity::Warning => SeveritySummary::Warning,
                Severity::Error => SeveritySummary::Error,
            },
            summary: self.summary.clone(),
            detail: self.detail.clone(),
            address: self.address.as_ref().map(|a| a.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(address) = &self.address {
            write!(f, " ({address})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n\n{detail}")?;
        }
        Ok(())
    }
}

/// An ordered collection of [`Diagnostic`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    /// Returns true if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(Diagnostic::is_error)
    }

    /// Returns the number of diagnostics.
    pub fn len(&self) -> usize {
        self.diags.len()
    }

    /// Returns true if there are no diagnostics.
    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// Iterates over the diagnostics in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diags.iter()
    }

    /// Keeps only the diagnostics for which the predicate returns true.
    pub fn retain(&mut self, f: impl FnMut(&Diagnostic) -> bool) {
        self.diags.retain(f);
    }

    /// Returns serializable summaries of every diagnostic.
    pub fn to_summaries(&self) -> Vec<DiagnosticSummary> {
        self.diags.iter().map(Diagnostic::to_summary).collect()
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self { diags: vec![diag] }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.diags.extend(iter);
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self {
            diags: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diags.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diags.iter()
    }
}
