// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `infratest` runs.
///
/// Test runs against real infrastructure only distinguish between "everything passed" and
/// "something needs attention". Any failure, error, skipped run, hard cancellation or setup error
/// results in [`TEST_RUN_FAILED`](Self::TEST_RUN_FAILED).
pub enum InfratestExitCode {}

impl InfratestExitCode {
    /// Every file in the suite passed and the run was not cancelled.
    pub const OK: i32 = 0;

    /// The suite did not pass, was cancelled, or could not be set up.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// Configuration or variable errors occurred before any test executed.
    ///
    /// This shares its value with [`TEST_RUN_FAILED`](Self::TEST_RUN_FAILED).
    pub const SETUP_ERROR: i32 = 1;
}
