// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    diagnostics::{Diagnostic, Diagnostics},
    suite::{RunConfig, TestFileConfig},
};
use std::collections::BTreeMap;

/// A loaded module configuration, as understood by the runner.
///
/// The runner only looks at declared variables and provider configurations. Everything else is
/// carried in `body` and interpreted by the engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleConfig {
    /// Where the module was loaded from, used in messages.
    pub source: String,

    /// The input variables the module declares.
    pub variables: BTreeMap<String, VariableDecl>,

    /// Provider configurations, keyed by local name and optional alias (`aws` or `aws.west`).
    pub providers: BTreeMap<String, ProviderConfig>,

    /// The rest of the module.
    pub body: serde_json::Value,
}

/// A declared input variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VariableDecl {
    /// The default value. Variables without a default are required.
    pub default: Option<serde_json::Value>,
}

impl VariableDecl {
    /// Returns true if a value must be provided for this variable.
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A provider configuration block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProviderConfig {
    /// The provider's local name, e.g. `aws`.
    pub name: String,

    /// The alias, if any.
    pub alias: Option<String>,

    /// The configuration arguments.
    pub config: serde_json::Value,
}

impl ProviderConfig {
    /// Returns the key this provider is stored under: `name` or `name.alias`.
    pub fn key(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{}.{alias}", self.name),
            None => self.name.clone(),
        }
    }
}

impl ModuleConfig {
    /// Returns a copy of this configuration prepared for a single run.
    ///
    /// Provider blocks from the test file are layered over the module's own. If the run maps
    /// providers explicitly, only the mapped providers are layered, under their in-module names.
    /// A mapping that names a provider the file doesn't define produces an error.
    pub fn transform_for_test(
        &self,
        run: Option<&RunConfig>,
        file: &TestFileConfig,
    ) -> (ModuleConfig, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut next = self.clone();

        match run {
            Some(run) if !run.providers.is_empty() => {
                for mapping in &run.providers {
                    let Some(provider) = file.providers.get(&mapping.in_parent) else {
                        diags.push(Diagnostic::error(
                            format!("Missing provider definition for {}", mapping.in_parent),
                            "This provider block references a provider definition that does not exist.",
                        ));
                        continue;
                    };

                    let (name, alias) = match mapping.in_child.split_once('.') {
                        Some((name, alias)) => (name.to_owned(), Some(alias.to_owned())),
                        None => (mapping.in_child.clone(), None),
                    };
                    next.providers.insert(
                        mapping.in_child.clone(),
                        ProviderConfig {
                            name,
                            alias,
                            config: provider.config.clone(),
                        },
                    );
                }
            }
            _ => {
                for (key, provider) in &file.providers {
                    next.providers.insert(key.clone(), provider.clone());
                }
            }
        }

        (next, diags)
    }
}
