// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for infratest, an integration-test orchestrator for infrastructure
//! provisioning engines.
//!
//! The basic flow: a [`Suite`](suite::Suite) of test files is handed to a
//! [`TestRunner`](runner::TestRunner) along with an [`Engine`](engine::Engine). The runner
//! executes files in lexicographic order and runs within each file in authored order. Each run
//! plans (and optionally applies) a configuration, then evaluates its assertions. At the end of
//! every file, all the infrastructure created by that file is destroyed.
//!
//! The run can be interrupted twice. The first interrupt lets in-flight work finish and skips
//! everything else, but still cleans up. The second interrupt abandons in-flight work and cleanup,
//! and reports what may have been left behind.

pub mod addrs;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod interrupt;
pub mod output;
pub mod reporter;
pub mod runner;
pub mod signal;
mod stopwatch;
pub mod suite;
pub mod variables;

pub use infratest_metadata::Status;
