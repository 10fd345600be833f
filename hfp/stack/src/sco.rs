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

//! Bookkeeping for the shared audio link and for voice recognition, which drives it outside of
//! calls.

use log::debug;

use crate::address::RawAddress;
use crate::telephony::{CallPhase, PhoneState};
use crate::transport::HfAudioState;

/// State around the single audio link. The peer holding the link is tracked by the
/// connection roles.
#[derive(Debug)]
pub struct ScoSession {
    pub audio_state: HfAudioState,
    /// Peer that asked for a call to be answered or placed.
    sco_requested: Option<RawAddress>,
    /// Peer whose audio was last closed on request while a connection was in flight.
    last_disconnect_requested: Option<RawAddress>,
    pub force: bool,
    pub route_allowed: bool,
    pub silence_playing: bool,
}

impl Default for ScoSession {
    fn default() -> Self {
        Self {
            audio_state: HfAudioState::Disconnected,
            sco_requested: None,
            last_disconnect_requested: None,
            force: false,
            route_allowed: true,
            silence_playing: false,
        }
    }
}

impl ScoSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.audio_state == HfAudioState::Connected
    }

    /// Audio may only come up with a reason to carry voice.
    pub fn is_sco_acceptable(
        &self,
        phone: &PhoneState,
        voice_recognition: bool,
        virtual_call: bool,
        inband_ringing: bool,
    ) -> bool {
        if self.force {
            return true;
        }
        if !self.route_allowed {
            return false;
        }
        if voice_recognition || virtual_call {
            return true;
        }
        if phone.call.num_active > 0 || phone.call.num_held > 0 {
            return true;
        }
        if !matches!(phone.call.phase, CallPhase::Idle | CallPhase::Incoming) {
            return true;
        }
        inband_ringing && phone.is_ringing()
    }

    pub fn set_sco_requested(&mut self, addr: RawAddress) {
        self.sco_requested = Some(addr);
    }

    pub fn set_last_disconnect_requested(&mut self, addr: RawAddress) {
        self.last_disconnect_requested = Some(addr);
    }

    /// Picks the peer to open audio to, consuming whichever remembered peer is used.
    pub fn select_target(&mut self, current: Option<RawAddress>) -> Option<RawAddress> {
        if let Some(addr) = self.last_disconnect_requested.take() {
            debug!("[{}]: audio target is the last disconnect-requested peer", addr);
            return Some(addr);
        }
        if let Some(addr) = self.sco_requested.take() {
            debug!("[{}]: audio target is the sco-requested peer", addr);
            return Some(addr);
        }
        current
    }

    pub fn clear_remembered(&mut self) {
        self.sco_requested = None;
        self.last_disconnect_requested = None;
    }
}

/// Voice recognition session on one peer.
#[derive(Debug, Default)]
pub struct VoiceRecognition {
    pub started: bool,
    /// Peer that asked for recognition, waiting for the local side to start it.
    pub waiting: Option<RawAddress>,
    /// Peer to open audio to once the music stream stops.
    pub pending_sco: Option<RawAddress>,
}

impl VoiceRecognition {
    pub fn is_active(&self) -> bool {
        self.started || self.waiting.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telephony::CallState;

    const A: RawAddress = RawAddress::new([0xa, 0, 0, 0, 0, 1]);
    const B: RawAddress = RawAddress::new([0xb, 0, 0, 0, 0, 2]);

    #[test]
    fn acceptable_only_with_a_reason() {
        let mut sco = ScoSession::new();
        let mut phone = PhoneState::default();
        assert!(!sco.is_sco_acceptable(&phone, false, false, false));
        assert!(sco.is_sco_acceptable(&phone, true, false, false));
        assert!(sco.is_sco_acceptable(&phone, false, true, false));

        phone.call = CallState::new(0, 0, CallPhase::Incoming);
        assert!(!sco.is_sco_acceptable(&phone, false, false, false));
        assert!(sco.is_sco_acceptable(&phone, false, false, true));

        phone.call = CallState::new(0, 0, CallPhase::Dialing);
        assert!(sco.is_sco_acceptable(&phone, false, false, false));

        sco.route_allowed = false;
        assert!(!sco.is_sco_acceptable(&phone, false, false, false));
        sco.force = true;
        assert!(sco.is_sco_acceptable(&PhoneState::default(), false, false, false));
    }

    #[test]
    fn target_selection_consumes() {
        let mut sco = ScoSession::new();
        sco.set_sco_requested(B);
        sco.set_last_disconnect_requested(A);
        assert_eq!(sco.select_target(None), Some(A));
        assert_eq!(sco.select_target(None), Some(B));
        assert_eq!(sco.select_target(None), None);
        assert_eq!(sco.select_target(Some(B)), Some(B));
    }
}
