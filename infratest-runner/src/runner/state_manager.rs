// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks the infrastructure created while executing a single test file.

use super::executor::{ExecutorContext, RunRef, RunScope};
use crate::{
    diagnostics::Diagnostics,
    engine::{ModuleConfig, State},
    reporter::TestEventKind,
    suite::{Run, RunConfig, RunIdentity, TestFileConfig},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// The states a test file has to keep track of.
///
/// The main state belongs to the configuration under test and is updated by every run that
/// doesn't name a different module. Runs that do name a different module get a fresh state each,
/// appended to `modules` in execution order.
#[derive(Debug, Default)]
pub(super) struct StateManager {
    main: State,
    modules: Vec<ModuleState>,
}

/// The state left by a run that executed a different module.
#[derive(Debug)]
struct ModuleState {
    state: State,
    run: RunIdentity,
    run_config: Arc<RunConfig>,
    config: Arc<ModuleConfig>,
}

impl StateManager {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn main(&self) -> &State {
        &self.main
    }

    pub(super) fn set_main(&mut self, state: State) {
        self.main = state;
    }

    pub(super) fn push_module(&mut self, state: State, run: &Run, config: Arc<ModuleConfig>) {
        self.modules.push(ModuleState {
            state,
            run: run.id.clone(),
            run_config: run.config.clone(),
            config,
        });
    }

    /// Returns a copy of every state, main state first. `None` identifies the main state.
    pub(super) fn snapshot(&self) -> Vec<(Option<RunIdentity>, State)> {
        std::iter::once((None, self.main.clone()))
            .chain(
                self.modules
                    .iter()
                    .map(|module| (Some(module.run.clone()), module.state.clone())),
            )
            .collect()
    }

    /// Destroys the main state, then every module state in reverse order.
    ///
    /// Nothing is destroyed once a cancel has been requested, including between states.
    pub(super) async fn cleanup(
        &self,
        executor: &ExecutorContext,
        file_name: &str,
        file_config: &TestFileConfig,
    ) {
        if executor.is_cancelled() {
            debug!(file = file_name, "cancelled, skipping cleanup");
            return;
        }

        let scope = RunScope {
            file_name,
            file_config,
            run: None,
        };
        let execution = executor
            .destroy(scope, executor.main_config(), self.main.clone(), self)
            .await;
        report_destroy(executor, file_name, None, execution.state, execution.diagnostics);

        for module in self.modules.iter().rev() {
            if executor.is_cancelled() {
                debug!(file = file_name, "cancelled during cleanup");
                return;
            }

            let scope = RunScope {
                file_name,
                file_config,
                run: Some(RunRef {
                    id: &module.run,
                    config: &module.run_config,
                }),
            };
            let execution = executor
                .destroy(scope, &module.config, module.state.clone(), self)
                .await;
            report_destroy(
                executor,
                file_name,
                Some(&module.run),
                execution.state,
                execution.diagnostics,
            );
        }
    }
}

fn report_destroy(
    executor: &ExecutorContext,
    file_name: &str,
    run: Option<&RunIdentity>,
    state: State,
    diagnostics: Diagnostics,
) {
    if diagnostics.has_errors() || !state.is_empty() {
        warn!(
            file = file_name,
            run = run.map(|run| run.name.as_str()),
            remaining = state.resources.len(),
            "failed to destroy everything created by the test file",
        );
    }
    executor.send(TestEventKind::DestroySummary {
        file: file_name.to_owned(),
        run: run.cloned(),
        state,
        diagnostics,
    });
}
