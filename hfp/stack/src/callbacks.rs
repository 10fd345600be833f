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

//! Observer notifications and the registry of observers.

use num_derive::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;

use crate::address::RawAddress;

/// Connection state reported to observers.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProfileConnectionState {
    Disconnected = 0,
    Connecting,
    Connected,
    Disconnecting,
}

/// Audio state reported to observers.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum AudioState {
    Disconnected = 10,
    Connecting = 11,
    Connected = 12,
}

/// Bluetooth SIG company identifiers of vendor AT command owners.
pub mod company_id {
    pub const APPLE: u32 = 76;
    pub const PLANTRONICS: u32 = 85;
    pub const GOOGLE: u32 = 224;
}

/// Receives gateway state changes.
pub trait IHfpCallback {
    fn on_connection_state_changed(
        &mut self,
        addr: RawAddress,
        prev: ProfileConnectionState,
        state: ProfileConnectionState,
    );

    fn on_audio_state_changed(&mut self, addr: RawAddress, prev: AudioState, state: AudioState);

    /// A peer sent a vendor specific command the gateway recognized.
    fn on_vendor_event(&mut self, addr: RawAddress, company_id: u32, command: &str, args: &str);
}

/// Registered observers keyed by the id handed out on registration.
pub struct Callbacks<T: ?Sized> {
    callbacks: HashMap<u32, Box<T>>,
    next_id: u32,
}

impl<T: ?Sized> Default for Callbacks<T> {
    fn default() -> Self {
        Self { callbacks: HashMap::new(), next_id: 1 }
    }
}

impl<T: ?Sized> Callbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Box<T>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.insert(id, callback);
        id
    }

    /// Returns false if `id` is not recognized.
    pub fn remove_callback(&mut self, id: u32) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    pub fn get_by_id_mut(&mut self, id: u32) -> Option<&mut Box<T>> {
        self.callbacks.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn for_all_callbacks<F: FnMut(&mut Box<T>)>(&mut self, mut f: F) {
        let mut ids: Vec<u32> = self.callbacks.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(callback) = self.callbacks.get_mut(&id) {
                f(callback);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<(RawAddress, ProfileConnectionState)>>>,
    }

    impl IHfpCallback for Recorder {
        fn on_connection_state_changed(
            &mut self,
            addr: RawAddress,
            _prev: ProfileConnectionState,
            state: ProfileConnectionState,
        ) {
            self.seen.lock().unwrap().push((addr, state));
        }

        fn on_audio_state_changed(&mut self, _: RawAddress, _: AudioState, _: AudioState) {}

        fn on_vendor_event(&mut self, _: RawAddress, _: u32, _: &str, _: &str) {}
    }

    #[test]
    fn register_and_remove() {
        let seen = Arc::new(Mutex::new(vec![]));
        let mut callbacks: Callbacks<dyn IHfpCallback + Send> = Callbacks::new();
        let first = callbacks.add_callback(Box::new(Recorder { seen: seen.clone() }));
        let second = callbacks.add_callback(Box::new(Recorder { seen: seen.clone() }));
        assert_ne!(first, second);

        let addr = RawAddress::new([1, 2, 3, 4, 5, 6]);
        callbacks.for_all_callbacks(|cb| {
            cb.on_connection_state_changed(
                addr,
                ProfileConnectionState::Connecting,
                ProfileConnectionState::Connected,
            )
        });
        assert_eq!(seen.lock().unwrap().len(), 2);

        assert!(callbacks.remove_callback(first));
        assert!(!callbacks.remove_callback(first));
        assert_eq!(callbacks.len(), 1);
    }
}
