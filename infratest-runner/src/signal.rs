// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals in infratest.
//!
//! Every shutdown signal counts as one interrupt. The runner escalates on the second one.

use crate::errors::SignalHandlerSetupError;
use tokio::sync::mpsc;

/// The kind of signal handling to set up for a test run.
///
/// A `SignalHandlerKind` can be passed into
/// [`TestRunnerBuilder::set_signal_handler`](crate::runner::TestRunnerBuilder::set_signal_handler).
#[derive(Debug)]
pub enum SignalHandlerKind {
    /// The standard signal handler. Capture interrupt and termination signals depending on the
    /// platform.
    Standard,

    /// A no-op signal handler. Useful for tests.
    Noop,

    /// Interrupts are delivered through a [`SimulatedInterrupts`] handle instead of the operating
    /// system. Useful for tests.
    Simulated(SimulatedReceiver),
}

impl SignalHandlerKind {
    /// Returns a handle for sending interrupts, along with the handler kind that receives them.
    pub fn simulated() -> (SimulatedInterrupts, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            SimulatedInterrupts { sender },
            Self::Simulated(SimulatedReceiver { receiver }),
        )
    }

    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::new(),
            Self::Noop => Ok(SignalHandler::noop()),
            Self::Simulated(receiver) => Ok(SignalHandler {
                source: SignalSource::Simulated(receiver),
            }),
        }
    }
}

/// Sends simulated interrupts to a runner built with [`SignalHandlerKind::simulated`].
#[derive(Clone, Debug)]
pub struct SimulatedInterrupts {
    sender: mpsc::UnboundedSender<ShutdownEvent>,
}

impl SimulatedInterrupts {
    /// Delivers one interrupt. Returns false if the runner has already gone away.
    pub fn interrupt(&self) -> bool {
        self.sender.send(ShutdownEvent::Interrupt).is_ok()
    }
}

/// The receiving half of [`SimulatedInterrupts`].
#[derive(Debug)]
pub struct SimulatedReceiver {
    receiver: mpsc::UnboundedReceiver<ShutdownEvent>,
}

/// The signal handler implementation.
#[derive(Debug)]
pub(crate) struct SignalHandler {
    source: SignalSource,
}

#[derive(Debug)]
enum SignalSource {
    Os(imp::Signals),
    Simulated(SimulatedReceiver),
    None,
}

impl SignalHandler {
    /// Creates a new `SignalHandler` that handles Ctrl-C and other signals.
    ///
    /// Must be called from within a Tokio runtime context.
    fn new() -> Result<Self, SignalHandlerSetupError> {
        let signals = imp::Signals::new().map_err(SignalHandlerSetupError::new)?;
        Ok(Self {
            source: SignalSource::Os(signals),
        })
    }

    /// Creates a new `SignalHandler` that does nothing.
    pub(crate) fn noop() -> Self {
        Self {
            source: SignalSource::None,
        }
    }

    /// Waits for the next shutdown signal. Returns `None` once no more signals can arrive, in
    /// which case this future should not be polled again.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        match &mut self.source {
            SignalSource::Os(signals) => signals.recv().await,
            SignalSource::Simulated(sim) => sim.receiver.recv().await,
            SignalSource::None => None,
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use tokio::signal::unix::{Signal, SignalKind, signal};

    /// Signals for SIGINT, SIGTERM and SIGHUP on Unix.
    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: SignalWithDone,
        sighup: SignalWithDone,
        sigterm: SignalWithDone,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            let sigint = SignalWithDone::new(SignalKind::interrupt())?;
            let sighup = SignalWithDone::new(SignalKind::hangup())?;
            let sigterm = SignalWithDone::new(SignalKind::terminate())?;

            Ok(Self {
                sigint,
                sighup,
                sigterm,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            loop {
                tokio::select! {
                    recv = self.sigint.signal.recv(), if !self.sigint.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Interrupt),
                            None => self.sigint.done = true,
                        }
                    }
                    recv = self.sighup.signal.recv(), if !self.sighup.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Hangup),
                            None => self.sighup.done = true,
                        }
                    }
                    recv = self.sigterm.signal.recv(), if !self.sigterm.done => {
                        match recv {
                            Some(()) => break Some(ShutdownEvent::Term),
                            None => self.sigterm.done = true,
                        }
                    }
                    else => {
                        break None
                    }
                }
            }
        }
    }

    #[derive(Debug)]
    struct SignalWithDone {
        signal: Signal,
        done: bool,
    }

    impl SignalWithDone {
        fn new(kind: SignalKind) -> std::io::Result<Self> {
            let signal = signal(kind)?;
            Ok(Self {
                signal,
                done: false,
            })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use tokio::signal::windows::{CtrlC, ctrl_c};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
        ctrl_c_done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            let ctrl_c = ctrl_c()?;
            Ok(Self {
                ctrl_c,
                ctrl_c_done: false,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownEvent> {
            if self.ctrl_c_done {
                return None;
            }

            match self.ctrl_c.recv().await {
                Some(()) => Some(ShutdownEvent::Interrupt),
                None => {
                    self.ctrl_c_done = true;
                    None
                }
            }
        }
    }
}

/// A signal event that should cause the suite to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// SIGHUP.
    #[cfg(unix)]
    Hangup,

    /// SIGTERM.
    #[cfg(unix)]
    Term,

    /// SIGINT, or Ctrl-C on Windows. Simulated interrupts also use this.
    Interrupt,
}
