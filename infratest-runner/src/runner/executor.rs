// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The executor for suites.
//!
//! This component walks the suite: it plans and applies each run, evaluates assertions, and
//! destroys whatever each file created.
//!
//! Note that the executor itself does not communicate directly with the outside world. All
//! communication is mediated by the dispatcher: the executor only observes the interrupt tokens
//! and sends [`TestEventKind`]s.

use super::state_manager::StateManager;
use crate::{
    Status,
    diagnostics::{Diagnostic, Diagnostics, Severity},
    engine::{
        CheckRequest, CheckResults, CheckTarget, Engine, EngineContext, ModuleConfig, Plan,
        PlanMode, PlanOpts, PlanOutcome, ResourceChange, Schemas, State,
    },
    interrupt::InterruptTokens,
    reporter::TestEventKind,
    suite::{
        Run, RunConfig, RunIdentity, Suite, TestCommand, TestFile, TestFileConfig, TestMode,
        Verbose,
    },
    variables::{
        UnparsedVariables, build_input_variables_for_assertions, build_input_variables_for_test,
    },
};
use std::{fmt, sync::Arc};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, warn};

#[derive(Debug)]
pub(super) struct ExecutorContext {
    config: Arc<ModuleConfig>,
    engine: Arc<dyn Engine>,
    globals: UnparsedVariables,
    verbose: bool,
    tokens: InterruptTokens,
    events: UnboundedSender<TestEventKind>,
}

impl ExecutorContext {
    pub(super) fn new(
        config: Arc<ModuleConfig>,
        engine: Arc<dyn Engine>,
        globals: UnparsedVariables,
        verbose: bool,
        tokens: InterruptTokens,
        events: UnboundedSender<TestEventKind>,
    ) -> Self {
        Self {
            config,
            engine,
            globals,
            verbose,
            tokens,
            events,
        }
    }

    /// Executes every file in the suite, in order.
    pub(super) async fn start(self, mut suite: Suite) -> Suite {
        suite.status = Status::Pass;
        for file in suite.files.values_mut() {
            if self.tokens.is_cancelled() {
                debug!("cancelled, not starting any more files");
                break;
            }

            self.execute_test_file(file).await;
            suite.status = suite.status.merge(file.status);
        }
        suite
    }

    async fn execute_test_file(&self, file: &mut TestFile) {
        debug!(file = %file.name, runs = file.runs.len(), "executing test file");

        let file_name = file.name.clone();
        let file_config = file.config.clone();
        let mut states = StateManager::new();

        file.status = file.status.merge(Status::Pass);
        let mut cancelled = false;
        for run in &mut file.runs {
            if self.tokens.is_cancelled() {
                // Remaining runs stay pending.
                cancelled = true;
                break;
            }
            if self.tokens.is_stopped() {
                run.status = Status::Skip;
                continue;
            }
            if file.status == Status::Error {
                debug!(run = %run.id, "skipping run after an earlier error");
                run.status = Status::Skip;
                continue;
            }

            match run.config.config_under_test.clone() {
                Some(module) => {
                    let state = self
                        .execute_test_run(
                            run,
                            &file_name,
                            &file_config,
                            State::new(),
                            &module,
                            &states,
                        )
                        .await;
                    states.push_module(state, run, module);
                }
                None => {
                    let config = self.config.clone();
                    let state = self
                        .execute_test_run(
                            run,
                            &file_name,
                            &file_config,
                            states.main().clone(),
                            &config,
                            &states,
                        )
                        .await;
                    states.set_main(state);
                }
            }
            file.status = file.status.merge(run.status);
        }

        if !cancelled {
            self.send(TestEventKind::FileFinished { file: file.clone() });
            for run in &file.runs {
                self.send(TestEventKind::RunFinished { run: run.clone() });
            }
        }

        states.cleanup(self, &file_name, &file_config).await;
    }

    async fn execute_test_run(
        &self,
        run: &mut Run,
        file_name: &str,
        file_config: &TestFileConfig,
        state: State,
        config: &Arc<ModuleConfig>,
        states: &StateManager,
    ) -> State {
        if self.tokens.is_cancelled() {
            return state;
        }
        if self.tokens.is_stopped() {
            run.status = Status::Skip;
            return state;
        }

        debug!(run = %run.id, command = ?run.config.command, "executing run");

        let (targets, diags) = run.config.targets();
        run.diagnostics.extend(diags);
        let (replaces, diags) = run.config.replaces();
        run.diagnostics.extend(diags);
        let (references, diags) = run.config.references();
        run.diagnostics.extend(diags);

        if run.diagnostics.has_errors() {
            run.status = Status::Error;
            return state;
        }

        let opts = PlanOpts {
            mode: match run.config.options.mode {
                TestMode::Normal => PlanMode::Normal,
                TestMode::RefreshOnly => PlanMode::RefreshOnly,
            },
            targets,
            force_replace: replaces,
            skip_refresh: !run.config.options.refresh,
            external_references: references,
            set_variables: Default::default(),
        };

        let scope = RunScope {
            file_name,
            file_config,
            run: Some(RunRef {
                id: &run.id,
                config: &run.config,
            }),
        };
        let Execution {
            context,
            plan,
            state,
            diagnostics,
        } = self
            .execute(scope, config, state, opts, run.config.command, states)
            .await;

        let diags = run.validate_expected_failures(diagnostics);
        let has_errors = diags.has_errors();
        run.diagnostics.extend(diags);

        if self.tokens.is_cancelled() {
            // The file may never be reported, so report this run's diagnostics now.
            self.send(TestEventKind::RunDiagnostics {
                run: run.id.clone(),
                diagnostics: run.diagnostics.clone(),
            });
            run.status = Status::Error;
            return state;
        }
        if has_errors {
            run.status = Status::Error;
            return state;
        }
        if self.tokens.is_stopped() {
            // An apply may have completed: its state is kept for cleanup.
            run.status = Status::Skip;
            return state;
        }

        let (Some(context), Some(plan)) = (context, plan) else {
            run.diagnostics.push(missing_plan(&run.id.to_string()));
            run.status = Status::Error;
            return state;
        };

        if self.verbose {
            self.record_verbose(run, &context, config, &state, &plan).await;
        }

        let (variables, diags) = build_input_variables_for_assertions(
            Some(&*run.config),
            Some(file_config),
            config,
            &self.globals,
        );
        let has_errors = diags.has_errors();
        run.diagnostics.extend(diags);
        if has_errors {
            run.status = Status::Error;
            return state;
        }

        let target = match run.config.command {
            TestCommand::Apply => CheckTarget::AppliedState,
            TestCommand::Plan => CheckTarget::PlannedState,
        };
        let checked_state = match target {
            CheckTarget::AppliedState => state.clone(),
            CheckTarget::PlannedState => plan.planned_state.clone(),
        };
        let task = {
            let run_config = run.config.clone();
            let config = config.clone();
            tokio::task::spawn_blocking(move || {
                context.evaluate_checks(&CheckRequest {
                    run: &run_config,
                    config: &config,
                    state: &checked_state,
                    plan: Some(&plan),
                    variables: &variables,
                    target,
                })
            })
        };

        match task.await {
            Ok(CheckResults {
                status,
                diagnostics,
            }) => {
                run.status = run.status.merge(Status::Pass).merge(status);
                run.diagnostics.extend(diagnostics);
            }
            Err(join_error) => {
                run.diagnostics
                    .push(join_error_diagnostic("evaluating assertions", join_error));
                run.status = Status::Error;
            }
        }

        debug!(run = %run.id, status = %run.status, "run finished");
        state
    }

    /// Fetches schemas and records verbose output on the run.
    ///
    /// Failures are reported as warnings only.
    async fn record_verbose(
        &self,
        run: &mut Run,
        context: &Arc<dyn EngineContext>,
        config: &Arc<ModuleConfig>,
        state: &State,
        plan: &Plan,
    ) {
        let task = {
            let context = context.clone();
            let config = config.clone();
            let state = state.clone();
            tokio::task::spawn_blocking(move || context.schemas(&config, &state))
        };
        let (schemas, mut diags) = match task.await {
            Ok(res) => res,
            Err(join_error) => (
                Schemas::default(),
                join_error_diagnostic("fetching schemas", join_error).into(),
            ),
        };

        if diags.has_errors() {
            diags = diags
                .into_iter()
                .map(|mut diag| {
                    diag.severity = Severity::Warning;
                    diag
                })
                .collect();
            diags.push(Diagnostic::warning(
                "Failed to print verbose output",
                format!(
                    "infratest failed to print the verbose output for {}, other diagnostics \
                     will contain more details as to why.",
                    run.id
                ),
            ));
        } else {
            run.verbose = Some(Box::new(Verbose {
                plan: Some(plan.clone()),
                state: state.clone(),
                config: config.clone(),
                providers: schemas.providers,
                provisioners: schemas.provisioners,
            }));
        }
        run.diagnostics.extend(diags);
    }

    /// Destroys everything in `state`.
    pub(super) async fn destroy(
        &self,
        scope: RunScope<'_>,
        config: &Arc<ModuleConfig>,
        state: State,
        states: &StateManager,
    ) -> Execution {
        self.execute(
            scope,
            config,
            state,
            PlanOpts::destroy(),
            TestCommand::Apply,
            states,
        )
        .await
    }

    /// Plans, then applies unless `command` is `Plan`.
    ///
    /// The configuration is transformed for the run and file in `scope`. `config` itself is never
    /// modified.
    async fn execute(
        &self,
        scope: RunScope<'_>,
        config: &Arc<ModuleConfig>,
        state: State,
        mut opts: PlanOpts,
        command: TestCommand,
        states: &StateManager,
    ) -> Execution {
        if opts.mode == PlanMode::Destroy && state.is_empty() {
            debug!(file = scope.file_name, "nothing to destroy");
            return Execution::unchanged(state, Diagnostics::new());
        }

        let run_config = scope.run.map(|run| run.config);
        let (transformed, mut diags) = config.transform_for_test(run_config, scope.file_config);
        if diags.has_errors() {
            return Execution::unchanged(state, diags);
        }
        let transformed = Arc::new(transformed);

        let (variables, variable_diags) = build_input_variables_for_test(
            run_config,
            Some(scope.file_config),
            &transformed,
            &self.globals,
        );
        let has_errors = variable_diags.has_errors();
        diags.extend(variable_diags);
        if has_errors {
            return Execution::unchanged(state, diags);
        }
        opts.set_variables = variables;

        // Plan.
        let context = match self.engine.new_context() {
            Ok(context) => context,
            Err(context_diags) => {
                diags.extend(context_diags);
                return Execution::unchanged(state, diags);
            }
        };
        let task = {
            let context = context.clone();
            let config = transformed.clone();
            let state = state.clone();
            tokio::task::spawn_blocking(move || context.plan(&config, &state, &opts))
        };
        let (outcome, wait_diags, cancelled) = self
            .wait(&context, task, "plan", scope, states, &[])
            .await;
        let PlanOutcome {
            plan,
            diagnostics: mut plan_diags,
        } = outcome.unwrap_or_default();
        plan_diags.extend(wait_diags);
        let plan_errors = plan_diags.has_errors();
        diags.extend(plan_diags);

        if plan_errors || command == TestCommand::Plan || cancelled {
            return Execution {
                context: Some(context),
                plan,
                state,
                diagnostics: diags,
            };
        }

        let Some(mut plan) = plan else {
            diags.push(missing_plan(&scope.to_string()));
            return Execution::unchanged(state, diags);
        };

        // Check blocks are re-evaluated by the apply: their plan-time warnings are stale.
        diags.retain(|diag| !diag.originates_from_check_block());

        if self.tokens.is_cancelled() {
            // The cancel landed after planning finished: don't start the apply at all.
            self.report_cancelled("apply", scope, states, &[]);
            return Execution {
                context: Some(context),
                plan: Some(plan),
                state,
                diagnostics: diags,
            };
        }

        // Apply, with a new context.
        let context = match self.engine.new_context() {
            Ok(context) => context,
            Err(context_diags) => {
                diags.extend(context_diags);
                return Execution::unchanged(state, diags);
            }
        };

        // The engine may remove changes from the plan as it applies them, so take a copy of what
        // is being created before the plan moves into the apply task.
        let created = plan.created_changes();
        let task = {
            let context = context.clone();
            let config = transformed.clone();
            tokio::task::spawn_blocking(move || {
                let outcome = context.apply(&mut plan, &config);
                (plan, outcome)
            })
        };
        let (result, wait_diags, _) = self
            .wait(&context, task, "apply", scope, states, &created)
            .await;

        let (plan, state) = match result {
            Some((plan, outcome)) => {
                diags.extend(outcome.diagnostics);
                (Some(plan), outcome.state)
            }
            // Nothing is known about partial progress: keep the prior state so that cleanup
            // still tries to destroy it.
            None => (None, state),
        };
        diags.extend(wait_diags);

        Execution {
            context: Some(context),
            plan,
            state,
            diagnostics: diags,
        }
    }

    /// Waits for an engine operation, arbitrating against stop and cancel requests.
    ///
    /// A stop lets the operation finish. A cancel reports what may be left behind, asks the
    /// engine to stop, and then waits for the operation with no time bound: the dispatcher
    /// decides how long to wait for the whole suite.
    ///
    /// Returns the operation's result (or `None` if its task failed), any diagnostics produced
    /// while waiting, and whether a cancel was observed.
    async fn wait<T>(
        &self,
        context: &Arc<dyn EngineContext>,
        mut task: JoinHandle<T>,
        operation: &'static str,
        scope: RunScope<'_>,
        states: &StateManager,
        created: &[ResourceChange],
    ) -> (Option<T>, Diagnostics, bool)
    where
        T: Send + 'static,
    {
        let mut stop_seen = false;
        let completed = loop {
            tokio::select! {
                biased;

                res = &mut task => break Some(res),
                () = self.tokens.cancelled() => break None,
                () = self.tokens.stopped(), if !stop_seen => {
                    debug!(operation, "stop requested, letting the engine finish");
                    stop_seen = true;
                }
            }
        };

        let (res, cancelled) = match completed {
            Some(res) => (res, false),
            None => {
                self.handle_cancelled(context, operation, scope, states, created);
                (task.await, true)
            }
        };

        match res {
            Ok(value) => (Some(value), Diagnostics::new(), cancelled),
            Err(join_error) => (
                None,
                join_error_diagnostic(operation, join_error).into(),
                cancelled,
            ),
        }
    }

    fn handle_cancelled(
        &self,
        context: &Arc<dyn EngineContext>,
        operation: &'static str,
        scope: RunScope<'_>,
        states: &StateManager,
        created: &[ResourceChange],
    ) {
        self.report_cancelled(operation, scope, states, created);

        // Stopping may block until the engine acknowledges it. The operation itself is awaited
        // by the caller.
        let context = context.clone();
        drop(tokio::task::spawn_blocking(move || context.stop()));
    }

    /// Reports everything the file is tracking, plus what `operation` planned to create.
    fn report_cancelled(
        &self,
        operation: &'static str,
        scope: RunScope<'_>,
        states: &StateManager,
        created: &[ResourceChange],
    ) {
        warn!(
            file = scope.file_name,
            operation, "hard cancel requested, stopping the engine"
        );

        let module = scope
            .run
            .and_then(|run| run.config.config_under_test.as_ref())
            .map(|module| module.source.clone());
        self.send(TestEventKind::FatalInterruptSummary {
            file: scope.file_name.to_owned(),
            run: scope.run.map(|run| run.id.clone()),
            module,
            states: states.snapshot(),
            created: created.to_vec(),
        });
    }

    pub(super) fn main_config(&self) -> &Arc<ModuleConfig> {
        &self.config
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.tokens.is_cancelled()
    }

    pub(super) fn send(&self, kind: TestEventKind) {
        if self.events.send(kind).is_err() {
            debug!("dispatcher has gone away, dropping event");
        }
    }
}

/// The file, and optionally the run, an engine operation executes for.
#[derive(Clone, Copy, Debug)]
pub(super) struct RunScope<'a> {
    pub(super) file_name: &'a str,
    pub(super) file_config: &'a TestFileConfig,
    pub(super) run: Option<RunRef<'a>>,
}

impl fmt::Display for RunScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.run {
            Some(run) => write!(f, "{}", run.id),
            None => f.write_str(self.file_name),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct RunRef<'a> {
    pub(super) id: &'a RunIdentity,
    pub(super) config: &'a RunConfig,
}

/// The result of [`ExecutorContext::execute`].
pub(super) struct Execution {
    /// The context of the last stage that started, if any did.
    pub(super) context: Option<Arc<dyn EngineContext>>,
    pub(super) plan: Option<Plan>,
    pub(super) state: State,
    pub(super) diagnostics: Diagnostics,
}

impl Execution {
    fn unchanged(state: State, diagnostics: Diagnostics) -> Self {
        Self {
            context: None,
            plan: None,
            state,
            diagnostics,
        }
    }
}

fn missing_plan(subject: &str) -> Diagnostic {
    Diagnostic::error(
        "Missing plan",
        format!("The engine did not produce a plan for {subject}, and reported no errors."),
    )
}

fn join_error_diagnostic(operation: &str, error: JoinError) -> Diagnostic {
    warn!(operation, "engine task failed: {error}");
    let detail = if error.is_panic() {
        format!("The engine panicked while running {operation}.")
    } else {
        format!("The engine task running {operation} was cancelled before it finished.")
    };
    Diagnostic::error("Engine operation failed", detail)
}
