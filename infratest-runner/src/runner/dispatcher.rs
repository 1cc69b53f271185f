// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    interrupt::InterruptTokens,
    reporter::{TestEvent, TestEventKind},
    signal::{ShutdownEvent, SignalHandler},
    stopwatch::{StopwatchStart, stopwatch},
    suite::Suite,
};
use debug_ignore::DebugIgnore;
use std::time::Duration;
use tokio::{
    sync::mpsc::UnboundedReceiver,
    task::{JoinError, JoinHandle},
    time::Instant,
};
use tracing::{debug, warn};

/// Context for the dispatcher.
///
/// This struct is responsible for coordinating events from the outside world and forwarding
/// events from the executor to the reporter callback.
#[derive_where::derive_where(Debug)]
pub(super) struct DispatcherContext<F> {
    callback: DebugIgnore<F>,
    stopwatch: StopwatchStart,
    tokens: InterruptTokens,
    cancel_grace_period: Duration,
    interrupt_count: usize,
}

impl<F> DispatcherContext<F>
where
    F: FnMut(TestEvent) + Send,
{
    pub(super) fn new(callback: F, tokens: InterruptTokens, cancel_grace_period: Duration) -> Self {
        Self {
            callback: DebugIgnore(callback),
            stopwatch: stopwatch(),
            tokens,
            cancel_grace_period,
            interrupt_count: 0,
        }
    }

    /// Reports the suite that is about to run.
    pub(super) fn suite_started(&mut self, suite: &Suite) {
        self.basic_callback(TestEventKind::SuiteStarted {
            summary: suite.to_summary(),
        });
        if !suite.diagnostics.is_empty() {
            self.basic_callback(TestEventKind::SuiteDiagnostics {
                diagnostics: suite.diagnostics.clone(),
            });
        }
    }

    /// Runs the dispatcher until the suite task finishes, or until it is abandoned after a hard
    /// cancel.
    pub(super) async fn run(
        &mut self,
        mut executor_rx: UnboundedReceiver<TestEventKind>,
        signal_handler: &mut SignalHandler,
        mut task: JoinHandle<Suite>,
    ) -> DispatcherOutcome {
        let mut grace = std::pin::pin!(tokio::time::sleep(Duration::ZERO));
        let mut grace_armed = false;
        let mut events_done = false;
        let mut signals_done = false;

        let result = loop {
            let internal_event = tokio::select! {
                // Executor events are forwarded before anything else is looked at.
                biased;

                event = executor_rx.recv(), if !events_done => {
                    match event {
                        Some(kind) => InternalEvent::Executor(kind),
                        None => {
                            events_done = true;
                            continue;
                        }
                    }
                }
                event = signal_handler.recv(), if !signals_done => {
                    match event {
                        Some(event) => InternalEvent::Signal(event),
                        None => {
                            signals_done = true;
                            continue;
                        }
                    }
                }
                () = self.tokens.cancelled(), if !grace_armed => InternalEvent::Cancelled,
                res = &mut task => break Some(res),
                () = &mut grace, if grace_armed => {
                    warn!(
                        grace_period = ?self.cancel_grace_period,
                        "suite did not finish within the grace period after a hard cancel, \
                         abandoning it",
                    );
                    break None;
                }
            };

            match internal_event {
                InternalEvent::Executor(kind) => self.basic_callback(kind),
                InternalEvent::Signal(event) => self.handle_shutdown_event(event),
                InternalEvent::Cancelled => {
                    debug!(
                        grace_period = ?self.cancel_grace_period,
                        "cancel requested, waiting for the suite to wind down",
                    );
                    grace
                        .as_mut()
                        .reset(Instant::now() + self.cancel_grace_period);
                    grace_armed = true;
                }
            }
        };

        // The suite task may have sent its last events after the receiver was polled.
        while let Ok(kind) = executor_rx.try_recv() {
            self.basic_callback(kind);
        }

        match result {
            Some(Ok(suite)) => {
                if !self.tokens.is_cancelled() {
                    self.basic_callback(TestEventKind::SuiteFinished {
                        summary: suite.to_summary(),
                    });
                }
                DispatcherOutcome::Finished(suite)
            }
            Some(Err(join_error)) => {
                warn!("suite task failed: {join_error}");
                DispatcherOutcome::Panicked(join_error)
            }
            None => DispatcherOutcome::Abandoned,
        }
    }

    fn handle_shutdown_event(&mut self, event: ShutdownEvent) {
        self.interrupt_count += 1;
        match self.interrupt_count {
            1 => {
                debug!(?event, "first interrupt received, stopping");
                self.basic_callback(TestEventKind::Interrupted);
                self.tokens.stop();
            }
            2 => {
                debug!(?event, "second interrupt received, cancelling");
                self.basic_callback(TestEventKind::FatalInterrupt);
                // The cancelled branch in run() arms the grace period.
                self.tokens.cancel();
            }
            count => {
                debug!(?event, count, "already cancelled, ignoring interrupt");
            }
        }
    }

    fn basic_callback(&mut self, kind: TestEventKind) {
        let snapshot = self.stopwatch.snapshot();
        let event = TestEvent {
            timestamp: snapshot.end_time(),
            elapsed: snapshot.duration,
            kind,
        };
        (self.callback)(event)
    }
}

#[derive(Debug)]
enum InternalEvent {
    Executor(TestEventKind),
    Signal(ShutdownEvent),
    Cancelled,
}

/// How the dispatcher finished.
#[derive(Debug)]
pub(super) enum DispatcherOutcome {
    /// The suite task finished.
    Finished(Suite),

    /// The suite task panicked.
    Panicked(JoinError),

    /// The suite task didn't finish within the grace period after a hard cancel.
    Abandoned,
}
