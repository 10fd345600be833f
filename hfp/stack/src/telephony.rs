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

//! Telephony collaborator and the call model it reports.

use num_derive::{FromPrimitive, ToPrimitive};

/// Setup phase of the call being placed or received.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum CallPhase {
    Dialing = 2,
    Alerting = 3,
    Incoming = 4,
    Idle = 6,
}

/// Aggregate call view as reported by telephony.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallState {
    pub num_active: u32,
    pub num_held: u32,
    pub phase: CallPhase,
    pub number: String,
    pub number_type: u32,
}

impl CallState {
    pub fn new(num_active: u32, num_held: u32, phase: CallPhase) -> Self {
        Self { num_active, num_held, phase, number: String::new(), number_type: 0 }
    }

    pub fn idle() -> Self {
        Self::new(0, 0, CallPhase::Idle)
    }

    pub fn with_number<S: Into<String>>(mut self, number: S, number_type: u32) -> Self {
        self.number = number.into();
        self.number_type = number_type;
        self
    }

    /// Whether the active and held counts are the same as `other`'s.
    pub fn same_counts(&self, other: &CallState) -> bool {
        self.num_active == other.num_active && self.num_held == other.num_held
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Network and battery indicators reported to peers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub service: bool,
    pub roam: bool,
    /// 0..=5
    pub signal: u8,
    /// 0..=5
    pub battery: u8,
}

#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum CallDirection {
    Outgoing = 0,
    Incoming = 1,
}

/// Status of one entry of a current-calls listing.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum ClccStatus {
    Active = 0,
    Held = 1,
    Dialing = 2,
    Alerting = 3,
    Incoming = 4,
    Waiting = 5,
}

#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum CallMode {
    Voice = 0,
    Data = 1,
    Fax = 2,
}

/// One line of a current-calls listing. Index 0 terminates the listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClccEntry {
    pub index: u32,
    pub direction: CallDirection,
    pub status: ClccStatus,
    pub mode: CallMode,
    pub multiparty: bool,
    pub number: String,
    pub number_type: u32,
}

impl ClccEntry {
    pub fn terminator() -> Self {
        Self {
            index: 0,
            direction: CallDirection::Outgoing,
            status: ClccStatus::Active,
            mode: CallMode::Voice,
            multiparty: false,
            number: String::new(),
            number_type: 0,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.index == 0
    }
}

/// Mutable phone view kept by the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneState {
    pub call: CallState,
    pub device: DeviceStatus,
    /// False while the ongoing call is not carried by the cellular modem.
    pub is_cs_call: bool,
    pub speaker_volume: u8,
    pub mic_volume: u8,
}

impl Default for PhoneState {
    fn default() -> Self {
        Self {
            call: CallState::idle(),
            device: DeviceStatus::default(),
            is_cs_call: true,
            speaker_volume: 0,
            mic_volume: 0,
        }
    }
}

impl PhoneState {
    pub fn is_in_call(&self) -> bool {
        self.call.num_active > 0 || self.call.num_held > 0 || self.call.phase != CallPhase::Idle
    }

    pub fn is_ringing(&self) -> bool {
        self.call.phase == CallPhase::Incoming
    }
}

/// The phone-side collaborator that places and answers calls.
pub trait ITelephony {
    fn answer_call(&mut self) -> bool;
    fn hangup_call(&mut self) -> bool;
    fn dial(&mut self, number: &str) -> bool;
    fn last_dialed_number(&self) -> Option<String>;
    fn send_dtmf(&mut self, code: char) -> bool;
    /// Three-way call control.
    fn process_chld(&mut self, chld: u32) -> bool;
    fn subscriber_number(&self) -> Option<String>;
    fn network_operator(&self) -> Option<String>;
    /// Requests a current-calls listing. Entries arrive later as `ClccResponse` events.
    fn list_current_calls(&mut self) -> bool;
    /// Asks telephony to report the current call state again.
    fn query_phone_state(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_call() {
        let mut phone = PhoneState::default();
        assert!(!phone.is_in_call());

        phone.call = CallState::new(0, 0, CallPhase::Incoming);
        assert!(phone.is_in_call());
        assert!(phone.is_ringing());

        phone.call = CallState::new(0, 1, CallPhase::Idle);
        assert!(phone.is_in_call());
        assert!(!phone.is_ringing());
    }

    #[test]
    fn counts() {
        let a = CallState::new(1, 0, CallPhase::Idle);
        let b = CallState::new(1, 0, CallPhase::Dialing).with_number("555", 129);
        assert!(a.same_counts(&b));
        assert!(!a.same_counts(&CallState::idle()));
    }
}
