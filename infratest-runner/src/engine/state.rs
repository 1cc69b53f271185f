// Copyright (c) The infratest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::addrs::Address;
use std::collections::BTreeMap;

/// A snapshot of the infrastructure managed by a configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct State {
    /// The resource instances in this state, keyed by address.
    pub resources: BTreeMap<Address, ResourceInstance>,
}

impl State {
    /// Creates a new, empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the state tracks no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Returns the addresses of every resource in this state, in order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> + '_ {
        self.resources.keys()
    }
}

/// A single resource instance tracked by a [`State`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceInstance {
    /// The attributes of the resource as recorded by the engine.
    pub attributes: serde_json::Value,
}
