// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`].
//!
//! The runner is split into two halves. The *executor* walks the suite on a background task: it
//! plans, applies, evaluates assertions and cleans up. The *dispatcher* stays on the calling
//! thread, forwards events from the executor to the reporter callback, and turns signals into
//! stop and cancel requests.

mod dispatcher;
mod executor;
mod imp;
mod state_manager;

pub use imp::*;
