// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::State;
use crate::{addrs::Address, variables::InputValues};
use std::fmt;

/// The mode a plan is created in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PlanMode {
    /// Converge the infrastructure towards the configuration.
    #[default]
    Normal,

    /// Only refresh the state from the real infrastructure.
    RefreshOnly,

    /// Destroy everything tracked by the state.
    Destroy,
}

/// Options passed to [`EngineContext::plan`](super::EngineContext::plan).
#[derive(Clone, Debug, Default)]
pub struct PlanOpts {
    /// The plan mode.
    pub mode: PlanMode,

    /// If non-empty, only these objects (and their dependencies) are planned.
    pub targets: Vec<Address>,

    /// Resources to replace even if they haven't changed.
    pub force_replace: Vec<Address>,

    /// If true, the prior state is not refreshed before planning.
    pub skip_refresh: bool,

    /// Objects the plan must evaluate because something outside the configuration refers to them.
    pub external_references: Vec<Address>,

    /// Input variable values for the root module.
    pub set_variables: InputValues,
}

impl PlanOpts {
    /// Returns options for a plan in destroy mode.
    pub fn destroy() -> Self {
        Self {
            mode: PlanMode::Destroy,
            ..Default::default()
        }
    }
}

/// The action a plan proposes for a resource instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChangeAction {
    /// No change.
    NoOp,

    /// Create a new object.
    Create,

    /// Read a data source.
    Read,

    /// Update an object in place.
    Update,

    /// Destroy an object.
    Delete,

    /// Destroy an object, then create its replacement.
    DeleteThenCreate,

    /// Create a replacement object, then destroy the original.
    CreateThenDelete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteThenCreate => "delete, then create",
            Self::CreateThenDelete => "create, then delete",
        })
    }
}

/// A proposed change to a single resource instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceChange {
    /// The resource instance being changed.
    pub address: Address,

    /// What will happen to it.
    pub action: ChangeAction,

    /// The planned attributes after the change, if known.
    pub after: Option<serde_json::Value>,
}

/// A plan produced by an engine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Plan {
    /// The mode the plan was created in.
    pub mode: PlanMode,

    /// The proposed changes, in the order the engine produced them.
    ///
    /// Engines may remove changes from this list as they are applied.
    pub changes: Vec<ResourceChange>,

    /// The state the plan was created from, after refreshing.
    pub prior_state: State,

    /// The state the infrastructure will be in if the plan is applied.
    pub planned_state: State,
}

impl Plan {
    /// Returns a copy of every change that creates a new object.
    pub fn created_changes(&self) -> Vec<ResourceChange> {
        self.changes
            .iter()
            .filter(|change| change.action == ChangeAction::Create)
            .cloned()
            .collect()
    }

    /// Returns true if the plan proposes no changes.
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|change| change.action == ChangeAction::NoOp)
    }
}
