// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a suite in human and machine-readable formats.
//!
//! The main type here is [`TestReporter`], which is constructed via a [`TestReporterBuilder`].

mod displayer;
mod events;
mod imp;
mod structured;

pub use events::*;
pub use imp::*;
