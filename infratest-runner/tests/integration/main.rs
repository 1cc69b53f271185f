// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the runner, driven by an in-memory engine.

mod basic;
mod interrupts;
