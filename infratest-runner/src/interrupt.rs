// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two interrupt latches shared by the driver and the suite task.
//!
//! A *stop* is a soft request: in-flight work finishes, everything else is skipped, and
//! infrastructure is still cleaned up. A *cancel* is a hard request: in-flight work is told to
//! stop, and nothing else starts, including cleanup.
//!
//! The stop token is a child of the cancel token, so cancelling always stops as well. Neither
//! latch can be reset.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A pair of one-way latches for soft stops and hard cancels.
///
/// Clones share the same latches.
#[derive(Clone, Debug)]
pub struct InterruptTokens {
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl InterruptTokens {
    /// Creates a new pair of unset latches.
    pub fn new() -> Self {
        let cancel = CancellationToken::new();
        let stop = cancel.child_token();
        Self { cancel, stop }
    }

    /// Requests a soft stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Requests a hard cancel. This also requests a stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true if a stop (or a cancel) has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Returns true if a cancel has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once a stop (or a cancel) has been requested.
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }

    /// Completes once a cancel has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

impl Default for InterruptTokens {
    fn default() -> Self {
        Self::new()
    }
}
