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

//! Transport façade: the AT-command/RFCOMM/SCO layer seen as primitive requests and typed
//! inbound events.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::address::RawAddress;
use crate::registry::{Codec, HfFeatures};
use crate::status::BtStatus;
use crate::telephony::{CallState, ClccEntry, DeviceStatus};

/// Control-link state as reported by the transport.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum HfConnectionState {
    Disconnected = 0,
    Connecting,
    Connected,
    SlcConnected,
    Disconnecting,
}

/// Audio-link state as reported by the transport.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum HfAudioState {
    Disconnected = 0,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeType {
    Speaker,
    Microphone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtResponse {
    Ok,
    Error,
}

/// Call control requested by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallControl {
    Answer,
    Hangup,
    /// Empty for "redial last number". A leading `>` selects a memory location.
    Dial(String),
    SendDtmf(char),
    KeyPress,
    Chld(u32),
    SubscriberNumber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorQuery {
    CurrentState,
    OperatorName,
    CurrentCalls,
}

/// Answer to a peer's indicator status query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CindResponse {
    pub service: bool,
    pub num_active: u32,
    pub num_held: u32,
    /// Call setup phase as it should be seen by the peer.
    pub call_setup: u32,
    pub signal: u8,
    pub roam: bool,
    pub battery: u8,
}

/// Events raised by the transport, each on behalf of one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionStateChanged { addr: RawAddress, state: HfConnectionState },
    AudioStateChanged { addr: RawAddress, state: HfAudioState },
    VoiceRecognitionChanged { addr: RawAddress, started: bool },
    CodecNegotiated { addr: RawAddress, codec: Codec },
    NoiseReductionChanged { addr: RawAddress, enabled: bool },
    VolumeChanged { addr: RawAddress, kind: VolumeType, volume: u8 },
    CallControl { addr: RawAddress, request: CallControl },
    IndicatorQuery { addr: RawAddress, query: IndicatorQuery },
    UnknownCommand { addr: RawAddress, raw: String },
    FeaturesReported { addr: RawAddress, features: HfFeatures },
}

impl TransportEvent {
    pub fn addr(&self) -> RawAddress {
        match self {
            TransportEvent::ConnectionStateChanged { addr, .. }
            | TransportEvent::AudioStateChanged { addr, .. }
            | TransportEvent::VoiceRecognitionChanged { addr, .. }
            | TransportEvent::CodecNegotiated { addr, .. }
            | TransportEvent::NoiseReductionChanged { addr, .. }
            | TransportEvent::VolumeChanged { addr, .. }
            | TransportEvent::CallControl { addr, .. }
            | TransportEvent::IndicatorQuery { addr, .. }
            | TransportEvent::UnknownCommand { addr, .. }
            | TransportEvent::FeaturesReported { addr, .. } => *addr,
        }
    }
}

/// Requests into the transport. Link and audio requests only start the operation, the outcome
/// arrives later as a `TransportEvent`.
pub trait IHfpTransport {
    fn connect(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn disconnect(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn connect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn disconnect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn configure_codec(&mut self, addr: RawAddress, codec: Codec) -> Result<(), BtStatus>;
    fn start_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn stop_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus>;
    fn set_volume(&mut self, addr: RawAddress, kind: VolumeType, volume: u8)
        -> Result<(), BtStatus>;
    fn at_response_code(&mut self, addr: RawAddress, code: AtResponse) -> Result<(), BtStatus>;
    fn at_response_string(&mut self, addr: RawAddress, response: &str) -> Result<(), BtStatus>;
    fn cind_response(&mut self, addr: RawAddress, cind: CindResponse) -> Result<(), BtStatus>;
    fn cops_response(&mut self, addr: RawAddress, operator: &str) -> Result<(), BtStatus>;
    fn clcc_response(&mut self, addr: RawAddress, entry: &ClccEntry) -> Result<(), BtStatus>;
    /// Sends call indicators to every connected peer.
    fn phone_state_change(&mut self, state: &CallState) -> Result<(), BtStatus>;
    fn notify_device_status(&mut self, status: DeviceStatus) -> Result<(), BtStatus>;
}
