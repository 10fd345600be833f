// Copyright 2022, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Externally owned peer policy: connection priority, bond state and quirky-peer detection.

use num_derive::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::address::RawAddress;

/// Stored connection priority of a peer.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum Priority {
    Undefined = -1,
    Off = 0,
    On = 100,
    AutoConnect = 1000,
}

#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum BondState {
    NotBonded = 0,
    Bonding,
    Bonded,
}

/// Read-only view of the persistent device store.
pub trait IPeerPolicy {
    fn priority(&self, addr: &RawAddress) -> Priority;
    fn bond_state(&self, addr: &RawAddress) -> BondState;

    /// Admission check for connections the peer initiated. An undefined priority is accepted
    /// since it usually means service discovery hasn't finished yet.
    fn ok_to_connect(&self, addr: &RawAddress) -> bool {
        let priority = self.priority(addr);
        let bond = self.bond_state(addr);
        let wanted = priority > Priority::Off
            || (priority == Priority::Undefined && bond != BondState::NotBonded);
        wanted && bond == BondState::Bonded
    }

    fn bonded_devices(&self) -> Vec<RawAddress> {
        vec![]
    }
}

impl<T: IPeerPolicy> IPeerPolicy for Arc<Mutex<T>> {
    fn priority(&self, addr: &RawAddress) -> Priority {
        self.lock().map_or(Priority::Undefined, |p| p.priority(addr))
    }

    fn bond_state(&self, addr: &RawAddress) -> BondState {
        self.lock().map_or(BondState::NotBonded, |p| p.bond_state(addr))
    }

    fn bonded_devices(&self) -> Vec<RawAddress> {
        self.lock().map_or(vec![], |p| p.bonded_devices())
    }
}

/// Recognizes peers that need the delayed incoming-call indication workaround.
pub trait IQuirkyPeer {
    fn is_quirky(&self, addr: &RawAddress) -> bool;
}

/// Quirk predicate matching configured address prefixes, case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct PrefixQuirks {
    prefixes: Vec<String>,
}

impl PrefixQuirks {
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Self {
        Self { prefixes: prefixes.iter().map(|p| p.as_ref().to_lowercase()).collect() }
    }
}

impl IQuirkyPeer for PrefixQuirks {
    fn is_quirky(&self, addr: &RawAddress) -> bool {
        let addr = addr.to_lower_string();
        self.prefixes.iter().any(|p| addr.starts_with(p.as_str()))
    }
}

/// In-memory device store.
#[derive(Debug, Default)]
pub struct PriorityStore {
    priorities: HashMap<RawAddress, Priority>,
    bonds: HashMap<RawAddress, BondState>,
}

impl PriorityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_priority(&mut self, addr: RawAddress, priority: Priority) {
        self.priorities.insert(addr, priority);
    }

    pub fn set_bond_state(&mut self, addr: RawAddress, state: BondState) {
        match state {
            BondState::NotBonded => {
                self.bonds.remove(&addr);
            }
            _ => {
                self.bonds.insert(addr, state);
            }
        }
    }
}

impl IPeerPolicy for PriorityStore {
    fn priority(&self, addr: &RawAddress) -> Priority {
        self.priorities.get(addr).copied().unwrap_or(Priority::Undefined)
    }

    fn bond_state(&self, addr: &RawAddress) -> BondState {
        self.bonds.get(addr).copied().unwrap_or(BondState::NotBonded)
    }

    fn bonded_devices(&self) -> Vec<RawAddress> {
        let mut devices: Vec<RawAddress> = self
            .bonds
            .iter()
            .filter(|(_, state)| **state == BondState::Bonded)
            .map(|(addr, _)| *addr)
            .collect();
        devices.sort();
        devices
    }
}
