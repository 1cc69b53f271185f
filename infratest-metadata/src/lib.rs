// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to infratest's machine-readable output.
//!
//! This crate holds the types that are shared between the runner and anything consuming its
//! results: the [`Status`] lattice, the documented [exit codes](InfratestExitCode), and the
//! serializable [`SuiteSummary`] emitted by the JSON reporter.

mod exit_codes;
mod status;
mod summary;

pub use exit_codes::*;
pub use status::*;
pub use summary::*;
