// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

// Note: the order here matters -- it is the severity order used by `merge`.
/// The outcome of a run, a file, or a whole suite.
///
/// Statuses form a lattice: [`merge`](Self::merge) returns the more severe of two statuses, using
/// the order `Error > Fail > Skip > Pass > Pending`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum Status {
    /// Not executed yet. This is also the final status of runs abandoned by a hard cancel.
    #[default]
    Pending,

    /// Executed, and every check passed.
    Pass,

    /// Not executed, or interrupted before its checks were evaluated.
    Skip,

    /// Executed, and at least one check failed.
    Fail,

    /// The run could not be executed or produced error diagnostics.
    Error,
}

impl Status {
    /// All the variants, from least to most severe.
    pub const ALL_VARIANTS: &'static [Self] =
        &[Self::Pending, Self::Pass, Self::Skip, Self::Fail, Self::Error];

    /// Joins two statuses, returning the more severe one.
    ///
    /// This is commutative, associative and idempotent. `Pending` is the identity.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    /// Joins all the given statuses, starting from `Pending`.
    pub fn merge_all(statuses: impl IntoIterator<Item = Self>) -> Self {
        statuses.into_iter().fold(Self::Pending, Self::merge)
    }

    /// Returns true if this status counts as a success for the purposes of the exit code.
    pub fn is_success(self) -> bool {
        self == Self::Pass
    }

    /// Returns a lowercase string for this status.
    pub fn to_static_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Skip => "skip",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}
