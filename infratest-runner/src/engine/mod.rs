// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface to the provisioning engine.
//!
//! The runner never plans or applies anything itself. It asks an [`Engine`] for a fresh
//! [`EngineContext`] for every plan and every apply, and drives those contexts from background
//! tasks so that interrupts can be observed while they run.
//!
//! Context methods are blocking: they are called from `spawn_blocking` tasks.

mod module;
mod plan;
mod state;

pub use module::*;
pub use plan::*;
pub use state::*;

use crate::{
    Status,
    diagnostics::Diagnostics,
    suite::RunConfig,
    variables::InputValues,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A factory for engine contexts.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Creates a new, independent context.
    fn new_context(&self) -> Result<Arc<dyn EngineContext>, Diagnostics>;
}

/// A single engine context, used for one plan or one apply.
pub trait EngineContext: Send + Sync {
    /// Creates a plan for `config` starting from `state`.
    ///
    /// A plan may be returned alongside error diagnostics.
    fn plan(&self, config: &ModuleConfig, state: &State, opts: &PlanOpts) -> PlanOutcome;

    /// Applies a plan, returning the new state.
    ///
    /// The state is returned even if applying fails partway through. Engines may remove changes
    /// from `plan` as they are applied.
    fn apply(&self, plan: &mut Plan, config: &ModuleConfig) -> ApplyOutcome;

    /// Asks an in-flight plan or apply to stop as soon as possible.
    ///
    /// May be called from any thread, and may block until the engine has acknowledged the
    /// request.
    fn stop(&self);

    /// Returns the provider and provisioner schemas used by `config` and `state`.
    fn schemas(&self, config: &ModuleConfig, state: &State) -> (Schemas, Diagnostics);

    /// Evaluates the assertions of a run.
    fn evaluate_checks(&self, request: &CheckRequest<'_>) -> CheckResults;
}

/// The result of [`EngineContext::plan`].
#[derive(Clone, Debug, Default)]
pub struct PlanOutcome {
    /// The plan, if one could be created.
    pub plan: Option<Plan>,

    /// Diagnostics produced while planning.
    pub diagnostics: Diagnostics,
}

/// The result of [`EngineContext::apply`].
#[derive(Clone, Debug, Default)]
pub struct ApplyOutcome {
    /// The state after applying, including any partial progress.
    pub state: State,

    /// Diagnostics produced while applying.
    pub diagnostics: Diagnostics,
}

/// Provider and provisioner schemas, as returned by [`EngineContext::schemas`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schemas {
    /// Provider schemas, keyed by provider name.
    pub providers: BTreeMap<String, serde_json::Value>,

    /// Provisioner schemas, keyed by provisioner name.
    pub provisioners: BTreeMap<String, serde_json::Value>,
}

/// What assertions are evaluated against.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CheckTarget {
    /// The state after an apply.
    AppliedState,

    /// The planned state of a plan.
    PlannedState,
}

/// A request to evaluate the assertions of a run.
#[derive(Debug)]
pub struct CheckRequest<'a> {
    /// The run whose check rules are evaluated.
    pub run: &'a RunConfig,

    /// The configuration the run executed.
    pub config: &'a ModuleConfig,

    /// The state to evaluate against: the applied state, or the plan's planned state.
    pub state: &'a State,

    /// The plan the run produced, if any.
    pub plan: Option<&'a Plan>,

    /// Every variable available to assertions.
    pub variables: &'a InputValues,

    /// Whether `state` is an applied or planned state.
    pub target: CheckTarget,
}

/// The result of evaluating a run's assertions.
#[derive(Clone, Debug, Default)]
pub struct CheckResults {
    /// `Pass` if every assertion held, `Fail` if any didn't, `Error` if any couldn't be evaluated.
    pub status: Status,

    /// Diagnostics for failed or unevaluable assertions.
    pub diagnostics: Diagnostics,
}
