// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input variable resolution.
//!
//! Variable values can be set in three places: on a run, on a test file, and globally (from the
//! command line or variable files). Values set on a run take precedence over values set on the
//! file, which take precedence over global values.
//!
//! Two different sets are built from these. Plans only receive values for variables the
//! configuration declares. Assertions can refer to every variable set anywhere, so they receive
//! all of them.

use crate::{
    diagnostics::{Diagnostic, Diagnostics},
    engine::{ModuleConfig, VariableDecl},
    suite::{RunConfig, TestFileConfig},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// A variable value that hasn't been parsed yet.
pub trait UnparsedVariableValue: fmt::Debug + Send + Sync {
    /// Parses the value.
    ///
    /// `decl` is the variable's declaration, or `None` if the configuration doesn't declare it.
    fn parse(&self, decl: Option<&VariableDecl>) -> Result<serde_json::Value, Diagnostics>;
}

/// A map of variable names to unparsed values.
pub type UnparsedVariables = BTreeMap<String, Arc<dyn UnparsedVariableValue>>;

/// A raw string value, as passed on the command line.
///
/// The value is parsed as JSON if possible, and is otherwise treated as a plain string. This means
/// `-var count=3` produces a number, and `-var name=web` produces a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawVariableValue {
    raw: String,
}

impl RawVariableValue {
    /// Creates a new raw value.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Wraps `raw` into an `Arc<dyn UnparsedVariableValue>`, for use in [`UnparsedVariables`].
    pub fn shared(raw: impl Into<String>) -> Arc<dyn UnparsedVariableValue> {
        Arc::new(Self::new(raw))
    }
}

impl UnparsedVariableValue for RawVariableValue {
    fn parse(&self, _decl: Option<&VariableDecl>) -> Result<serde_json::Value, Diagnostics> {
        Ok(serde_json::from_str(&self.raw)
            .unwrap_or_else(|_| serde_json::Value::String(self.raw.clone())))
    }
}

/// Where a variable's value came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ValueSource {
    /// Set on the run.
    Run,

    /// Set on the test file.
    File,

    /// Set globally.
    Global,

    /// Not set anywhere: this is the declared default.
    Default,
}

/// A parsed input value.
#[derive(Clone, Debug, PartialEq)]
pub struct InputValue {
    /// The value.
    pub value: serde_json::Value,

    /// Where it came from.
    pub source: ValueSource,
}

/// A map of variable names to parsed values.
pub type InputValues = BTreeMap<String, InputValue>;

/// Builds the values passed to a plan: only variables that `config` declares.
///
/// Declared variables that aren't set anywhere take their default. A declared variable with no
/// default and no value is an error.
pub fn build_input_variables_for_test(
    run: Option<&RunConfig>,
    file: Option<&TestFileConfig>,
    config: &ModuleConfig,
    globals: &UnparsedVariables,
) -> (InputValues, Diagnostics) {
    let mut variables = BTreeMap::new();
    for name in config.variables.keys() {
        if let Some(value) = lookup(name, run, file, globals) {
            variables.insert(name.clone(), value);
        }
        // Otherwise the variable might be optional: parse_variable_values decides.
    }

    parse_variable_values(variables, config)
}

/// Builds the values available to assertions: every variable set on the run, the file, or
/// globally, plus defaults for declared variables that aren't set.
///
/// Values for variables the configuration doesn't declare are kept, with a warning.
pub fn build_input_variables_for_assertions(
    run: Option<&RunConfig>,
    file: Option<&TestFileConfig>,
    config: &ModuleConfig,
    globals: &UnparsedVariables,
) -> (InputValues, Diagnostics) {
    let mut variables = BTreeMap::new();

    if let Some(run) = run {
        for (name, value) in &run.variables {
            variables.insert(name.clone(), (value.clone(), ValueSource::Run));
        }
    }
    if let Some(file) = file {
        for (name, value) in &file.variables {
            variables
                .entry(name.clone())
                .or_insert_with(|| (value.clone(), ValueSource::File));
        }
    }
    for (name, value) in globals {
        variables
            .entry(name.clone())
            .or_insert_with(|| (value.clone(), ValueSource::Global));
    }

    parse_variable_values(variables, config)
}

fn lookup(
    name: &str,
    run: Option<&RunConfig>,
    file: Option<&TestFileConfig>,
    globals: &UnparsedVariables,
) -> Option<(Arc<dyn UnparsedVariableValue>, ValueSource)> {
    if let Some(value) = run.and_then(|run| run.variables.get(name)) {
        return Some((value.clone(), ValueSource::Run));
    }
    if let Some(value) = file.and_then(|file| file.variables.get(name)) {
        return Some((value.clone(), ValueSource::File));
    }
    globals
        .get(name)
        .map(|value| (value.clone(), ValueSource::Global))
}

fn parse_variable_values(
    unparsed: BTreeMap<String, (Arc<dyn UnparsedVariableValue>, ValueSource)>,
    config: &ModuleConfig,
) -> (InputValues, Diagnostics) {
    let mut values = InputValues::new();
    let mut diags = Diagnostics::new();
    let provided: BTreeSet<String> = unparsed.keys().cloned().collect();

    for (name, (value, source)) in unparsed {
        let decl = config.variables.get(&name);
        if decl.is_none() {
            diags.push(Diagnostic::warning(
                "Value for undeclared variable",
                format!(
                    "The configuration in {} does not declare a variable named \"{name}\", \
                     so this value is only available to assertions.",
                    config.source,
                ),
            ));
        }

        match value.parse(decl) {
            Ok(value) => {
                values.insert(name, InputValue { value, source });
            }
            Err(parse_diags) => diags.extend(parse_diags),
        }
    }

    for (name, decl) in &config.variables {
        if provided.contains(name) {
            continue;
        }
        match &decl.default {
            Some(default) => {
                values.insert(
                    name.clone(),
                    InputValue {
                        value: default.clone(),
                        source: ValueSource::Default,
                    },
                );
            }
            None => diags.push(Diagnostic::error(
                "No value for required variable",
                format!(
                    "The input variable \"{name}\" is not set, and has no default value. \
                     Set it on the run, on the test file, or globally."
                ),
            )),
        }
    }

    (values, diags)
}
