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

//! Per-peer records: link sub-state, negotiated features, audio parameters and retry counters.

use bitflags::bitflags;
use log::debug;
use num_derive::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;

use crate::address::RawAddress;

/// Outgoing connect attempts allowed before a peer's retry counter is dropped.
pub const MAX_CONNECT_ATTEMPTS: u32 = 2;

bitflags! {
    /// Capabilities advertised by a hands-free peer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct HfFeatures: u32 {
        const EC_NR = 1 << 0;
        const THREE_WAY_CALLING = 1 << 1;
        const CLI_PRESENTATION = 1 << 2;
        const VOICE_RECOGNITION = 1 << 3;
        const REMOTE_VOLUME_CONTROL = 1 << 4;
        const ENHANCED_CALL_STATUS = 1 << 5;
        const ENHANCED_CALL_CONTROL = 1 << 6;
        const CODEC_NEGOTIATION = 1 << 7;
        const HF_INDICATORS = 1 << 8;
        const ESCO_S4 = 1 << 9;
    }
}

/// Speech codec in use on the audio link.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum Codec {
    Narrowband = 1,
    Wideband = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioParams {
    pub codec: Codec,
    pub nrec: bool,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self { codec: Codec::Narrowband, nrec: true }
    }
}

/// Local view of one peer's control link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerSubState {
    None,
    Connecting,
    ServiceLevelUp,
    Disconnecting,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerConnection {
    pub address: RawAddress,
    pub sub_state: PeerSubState,
    pub features: HfFeatures,
    pub audio: AudioParams,
    /// Outgoing attempts so far, `None` when no attempt is being tracked.
    pub retry_count: Option<u32>,
}

impl PeerConnection {
    fn new(address: RawAddress) -> Self {
        Self {
            address,
            sub_state: PeerSubState::None,
            features: HfFeatures::empty(),
            audio: AudioParams::default(),
            retry_count: None,
        }
    }
}

/// Owns every `PeerConnection`. Entries appear on the first request or event for a peer and are
/// released once the peer is fully disconnected with no retry outstanding.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    peers: HashMap<RawAddress, PeerConnection>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &RawAddress) -> Option<&PeerConnection> {
        self.peers.get(addr)
    }

    pub fn contains(&self, addr: &RawAddress) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn entry(&mut self, addr: RawAddress) -> &mut PeerConnection {
        self.peers.entry(addr).or_insert_with(|| PeerConnection::new(addr))
    }

    pub fn set_sub_state(&mut self, addr: RawAddress, state: PeerSubState) {
        self.entry(addr).sub_state = state;
    }

    pub fn sub_state(&self, addr: &RawAddress) -> PeerSubState {
        self.peers.get(addr).map_or(PeerSubState::None, |p| p.sub_state)
    }

    /// Whether another outgoing attempt is allowed. When the peer already used up its attempts
    /// the counter is forgotten and an otherwise idle record is released.
    pub fn begin_connect_attempt(&mut self, addr: RawAddress) -> bool {
        let Some(peer) = self.peers.get_mut(&addr) else {
            return true;
        };
        let count = peer.retry_count.unwrap_or(0);
        if count < MAX_CONNECT_ATTEMPTS {
            return true;
        }
        debug!("[{}]: retry budget exhausted ({})", addr, count);
        peer.retry_count = None;
        self.release(&addr);
        false
    }

    /// Records that an outgoing attempt was issued.
    pub fn record_connect_attempt(&mut self, addr: RawAddress) {
        let peer = self.entry(addr);
        peer.retry_count = Some(peer.retry_count.unwrap_or(0) + 1);
    }

    /// Reverts `record_connect_attempt` for an attempt that never left the host. The counter is
    /// forgotten once no attempt remains.
    pub fn rollback_connect_attempt(&mut self, addr: &RawAddress) {
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.retry_count = match peer.retry_count {
                Some(count) if count > 1 => Some(count - 1),
                _ => None,
            };
        }
    }

    pub fn addresses(&self) -> Vec<RawAddress> {
        self.peers.keys().copied().collect()
    }

    pub fn retry_count(&self, addr: &RawAddress) -> Option<u32> {
        self.peers.get(addr).and_then(|p| p.retry_count)
    }

    pub fn clear_retry(&mut self, addr: &RawAddress) {
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.retry_count = None;
        }
    }

    /// Returns false when the peer has no record yet.
    pub fn set_features(&mut self, addr: &RawAddress, features: HfFeatures) -> bool {
        match self.peers.get_mut(addr) {
            Some(peer) => {
                peer.features = features;
                true
            }
            None => false,
        }
    }

    pub fn features(&self, addr: &RawAddress) -> HfFeatures {
        self.peers.get(addr).map_or(HfFeatures::empty(), |p| p.features)
    }

    pub fn audio_params(&self, addr: &RawAddress) -> AudioParams {
        self.peers.get(addr).map_or(AudioParams::default(), |p| p.audio)
    }

    pub fn reset_audio_params(&mut self, addr: RawAddress) {
        self.entry(addr).audio = AudioParams::default();
    }

    /// Returns false when the peer has no record yet.
    pub fn set_codec(&mut self, addr: &RawAddress, codec: Codec) -> bool {
        match self.peers.get_mut(addr) {
            Some(peer) => {
                peer.audio.codec = codec;
                true
            }
            None => false,
        }
    }

    /// Returns false when the peer has no record yet.
    pub fn set_nrec(&mut self, addr: &RawAddress, enabled: bool) -> bool {
        match self.peers.get_mut(addr) {
            Some(peer) => {
                peer.audio.nrec = enabled;
                true
            }
            None => false,
        }
    }

    /// Drops the record of a fully disconnected peer unless a retry is still tracked for it.
    pub fn release(&mut self, addr: &RawAddress) {
        let removable = self
            .peers
            .get(addr)
            .map_or(false, |p| p.sub_state == PeerSubState::None && p.retry_count.is_none());
        if removable {
            self.peers.remove(addr);
        }
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: RawAddress = RawAddress::new([0, 1, 2, 3, 4, 5]);

    #[test]
    fn retry_budget() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.begin_connect_attempt(A));
        registry.record_connect_attempt(A);
        assert_eq!(registry.retry_count(&A), Some(1));

        assert!(registry.begin_connect_attempt(A));
        registry.record_connect_attempt(A);
        assert_eq!(registry.retry_count(&A), Some(2));

        // Third attempt is refused and the counter is forgotten.
        assert!(!registry.begin_connect_attempt(A));
        assert_eq!(registry.retry_count(&A), None);
        assert!(!registry.contains(&A));
    }

    #[test]
    fn lookups_leave_unknown_peers_alone() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.begin_connect_attempt(A));
        assert!(!registry.set_features(&A, HfFeatures::CODEC_NEGOTIATION));
        assert!(registry.is_empty());

        registry.set_sub_state(A, PeerSubState::Connecting);
        assert!(registry.set_features(&A, HfFeatures::CODEC_NEGOTIATION));
        assert_eq!(registry.features(&A), HfFeatures::CODEC_NEGOTIATION);
    }

    #[test]
    fn rollback_attempt() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.begin_connect_attempt(A));
        registry.record_connect_attempt(A);
        registry.record_connect_attempt(A);
        registry.rollback_connect_attempt(&A);
        assert_eq!(registry.retry_count(&A), Some(1));
        registry.rollback_connect_attempt(&A);
        assert_eq!(registry.retry_count(&A), None);
    }

    #[test]
    fn release_keeps_pending_retry() {
        let mut registry = DeviceRegistry::new();
        registry.record_connect_attempt(A);
        registry.release(&A);
        assert!(registry.contains(&A));

        registry.clear_retry(&A);
        registry.release(&A);
        assert!(!registry.contains(&A));
    }

    #[test]
    fn audio_params_reset() {
        let mut registry = DeviceRegistry::new();
        assert!(!registry.set_codec(&A, Codec::Wideband));

        registry.set_sub_state(A, PeerSubState::ServiceLevelUp);
        assert!(registry.set_codec(&A, Codec::Wideband));
        assert!(registry.set_nrec(&A, false));
        assert_eq!(registry.audio_params(&A), AudioParams { codec: Codec::Wideband, nrec: false });

        registry.reset_audio_params(A);
        assert_eq!(registry.audio_params(&A), AudioParams::default());
    }
}
