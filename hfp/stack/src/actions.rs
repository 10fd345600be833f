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

//! Outputs of the headset state machine. Actions are plain data, the driver executes them in
//! order against the collaborators.

use std::time::Duration;

use crate::address::RawAddress;
use crate::callbacks::{AudioState, ProfileConnectionState};
use crate::registry::Codec;
use crate::telephony::{CallState, ClccEntry, DeviceStatus};
use crate::timers::TimerId;
use crate::transport::{AtResponse, CindResponse, VolumeType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportAction {
    Connect(RawAddress),
    Disconnect(RawAddress),
    ConnectAudio(RawAddress),
    DisconnectAudio(RawAddress),
    ConfigureCodec(RawAddress, Codec),
    StartVoiceRecognition(RawAddress),
    StopVoiceRecognition(RawAddress),
    SetVolume(RawAddress, VolumeType, u8),
    AtResponse(RawAddress, AtResponse),
    AtString(RawAddress, String),
    Cind(RawAddress, CindResponse),
    Cops(RawAddress, String),
    Clcc(RawAddress, ClccEntry),
    PhoneState(CallState),
    DeviceStatus(DeviceStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioAction {
    ScoRoute(bool),
    Wideband(bool),
    Nrec(bool),
    ScoVolume { volume: u8, show_ui: bool },
    SuspendMedia(bool),
    StartSilence,
    StopSilence,
    VoipSession(bool),
}

/// Number to place for a dial request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialTarget {
    Number(String),
    LastDialed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelephonyAction {
    Answer,
    Hangup,
    Dial { addr: RawAddress, target: DialTarget },
    SendDtmf(char),
    Chld { addr: RawAddress, chld: u32 },
    SubscriberNumber(RawAddress),
    OperatorName(RawAddress),
    ListCurrentCalls(RawAddress),
    QueryPhoneState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    ConnectionState {
        addr: RawAddress,
        prev: ProfileConnectionState,
        state: ProfileConnectionState,
    },
    AudioState {
        addr: RawAddress,
        prev: AudioState,
        state: AudioState,
    },
    VendorEvent {
        addr: RawAddress,
        company_id: u32,
        command: String,
        args: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Transport(TransportAction),
    Audio(AudioAction),
    Telephony(TelephonyAction),
    Notify(Notification),
    StartTimer(TimerId, Duration),
    CancelTimer(TimerId),
}
