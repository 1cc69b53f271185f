// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    dispatcher::{DispatcherContext, DispatcherOutcome},
    executor::ExecutorContext,
};
use crate::{
    config::RunnerConfig,
    engine::{Engine, ModuleConfig},
    errors::{TestRunnerBuildError, TestRunnerExecuteError},
    interrupt::InterruptTokens,
    reporter::TestEvent,
    signal::{SignalHandler, SignalHandlerKind},
    suite::Suite,
    variables::UnparsedVariables,
};
use infratest_metadata::InfratestExitCode;
use std::{convert::Infallible, fmt, sync::Arc, time::Duration};
use tokio::{runtime::Runtime, sync::mpsc::unbounded_channel, task::JoinError};
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug)]
pub struct TestRunnerBuilder {
    verbose: bool,
    cancel_grace_period: Duration,
    interrupt_tokens: Option<InterruptTokens>,
    signal_handler: SignalHandlerKind,
}

impl TestRunnerBuilder {
    /// How long the runner waits for in-flight work after a hard cancel, unless configured
    /// otherwise.
    pub const DEFAULT_CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5);

    /// Creates a builder with options read from the runner configuration.
    pub fn from_config(config: &RunnerConfig) -> Self {
        let mut builder = Self::default();
        builder
            .set_verbose(config.verbose())
            .set_cancel_grace_period(config.cancel_grace_period());
        builder
    }

    /// Sets verbose mode. In verbose mode, each run records its plan or state, along with the
    /// provider and provisioner schemas needed to render them.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Sets how long to wait for the suite to wind down after a hard cancel.
    pub fn set_cancel_grace_period(&mut self, period: Duration) -> &mut Self {
        self.cancel_grace_period = period;
        self
    }

    /// Uses the given tokens instead of creating new ones.
    ///
    /// This lets embedders request a stop or a cancel without going through signals.
    pub fn set_interrupt_tokens(&mut self, tokens: InterruptTokens) -> &mut Self {
        self.interrupt_tokens = Some(tokens);
        self
    }

    /// Sets the kind of signal handling to use.
    pub fn set_signal_handler(&mut self, kind: SignalHandlerKind) -> &mut Self {
        self.signal_handler = kind;
        self
    }

    /// Creates a new test runner.
    ///
    /// `config` is the main configuration under test. `globals` are variable values that apply
    /// to every run unless a file or run overrides them.
    pub fn build(
        self,
        suite: Suite,
        config: Arc<ModuleConfig>,
        engine: Arc<dyn Engine>,
        globals: UnparsedVariables,
    ) -> Result<TestRunner, TestRunnerBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("infratest-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = self.signal_handler.build()?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                suite,
                config,
                engine,
                globals,
                verbose: self.verbose,
                cancel_grace_period: self.cancel_grace_period,
                tokens: self.interrupt_tokens.unwrap_or_default(),
                runtime,
            },
            signal_handler,
        })
    }
}

impl Default for TestRunnerBuilder {
    fn default() -> Self {
        Self {
            verbose: false,
            cancel_grace_period: Self::DEFAULT_CANCEL_GRACE_PERIOD,
            interrupt_tokens: None,
            signal_handler: SignalHandlerKind::Standard,
        }
    }
}

/// Context for running a suite.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    inner: TestRunnerInner,
    signal_handler: SignalHandler,
}

impl TestRunner {
    /// Returns the interrupt tokens this runner observes.
    pub fn interrupt_tokens(&self) -> &InterruptTokens {
        &self.inner.tokens
    }

    /// Executes the suite.
    ///
    /// The callback is called with every event, on the calling thread.
    ///
    /// Returns an error if the suite task panicked.
    pub fn execute<F>(
        self,
        mut callback: F,
    ) -> Result<RunOutcome, TestRunnerExecuteError<Infallible>>
    where
        F: FnMut(TestEvent) + Send,
    {
        self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        })
    }

    /// Executes the suite.
    ///
    /// Accepts a callback that is called with every event. If the callback returns an error, the
    /// suite is asked to stop: in-flight work finishes, remaining runs are skipped and cleanup
    /// still happens. Events keep being delivered in case the callback starts working again.
    ///
    /// Returns an error if the suite task panicked, or with the first error returned by the
    /// callback.
    pub fn try_execute<E, F>(
        mut self,
        mut callback: F,
    ) -> Result<RunOutcome, TestRunnerExecuteError<E>>
    where
        F: FnMut(TestEvent) -> Result<(), E> + Send,
        E: fmt::Debug + Send,
    {
        let mut first_error = None;
        let tokens = self.inner.tokens.clone();

        let res = self.inner.execute(&mut self.signal_handler, |event| {
            if let Err(error) = callback(event)
                && first_error.is_none()
            {
                warn!("error reporting event, stopping the suite: {error:?}");
                tokens.stop();
                first_error = Some(error);
            }
        });

        // A suite task abandoned after the grace period may still be blocked in the engine.
        // Don't wait for it.
        self.inner.runtime.shutdown_background();

        match (res, first_error) {
            (Err(join_error), _) => Err(TestRunnerExecuteError::SuiteTaskPanicked(join_error)),
            (Ok(_), Some(report_error)) => Err(TestRunnerExecuteError::ReportError(report_error)),
            (Ok(outcome), None) => Ok(outcome),
        }
    }
}

#[derive(Debug)]
struct TestRunnerInner {
    suite: Suite,
    config: Arc<ModuleConfig>,
    engine: Arc<dyn Engine>,
    globals: UnparsedVariables,
    verbose: bool,
    cancel_grace_period: Duration,
    tokens: InterruptTokens,
    runtime: Runtime,
}

impl TestRunnerInner {
    fn execute<F>(
        &mut self,
        signal_handler: &mut SignalHandler,
        callback: F,
    ) -> Result<RunOutcome, JoinError>
    where
        F: FnMut(TestEvent) + Send,
    {
        let suite = std::mem::take(&mut self.suite);

        let mut dispatcher_cx =
            DispatcherContext::new(callback, self.tokens.clone(), self.cancel_grace_period);
        dispatcher_cx.suite_started(&suite);

        let (event_tx, event_rx) = unbounded_channel();
        let executor_cx = ExecutorContext::new(
            self.config.clone(),
            self.engine.clone(),
            self.globals.clone(),
            self.verbose,
            self.tokens.clone(),
            event_tx,
        );

        let outcome = self.runtime.block_on(async {
            let task = tokio::spawn(executor_cx.start(suite));
            dispatcher_cx.run(event_rx, signal_handler, task).await
        });

        let cancelled = self.tokens.is_cancelled();
        debug!(cancelled, "suite execution finished");
        match outcome {
            DispatcherOutcome::Finished(suite) => Ok(RunOutcome {
                suite: Some(suite),
                cancelled,
            }),
            DispatcherOutcome::Abandoned => Ok(RunOutcome {
                suite: None,
                cancelled,
            }),
            DispatcherOutcome::Panicked(join_error) => Err(join_error),
        }
    }
}

/// The result of executing a suite.
#[derive(Debug)]
pub struct RunOutcome {
    /// The suite with final statuses, or `None` if the suite task was abandoned because it
    /// didn't finish within the grace period after a hard cancel.
    pub suite: Option<Suite>,

    /// True if a hard cancel was requested.
    pub cancelled: bool,
}

impl RunOutcome {
    /// Returns the exit code for this outcome.
    ///
    /// This is [`InfratestExitCode::OK`] only if the suite passed and no hard cancel was
    /// requested.
    pub fn exit_code(&self) -> i32 {
        match &self.suite {
            Some(suite) if !self.cancelled && suite.status.is_success() => InfratestExitCode::OK,
            _ => InfratestExitCode::TEST_RUN_FAILED,
        }
    }
}
