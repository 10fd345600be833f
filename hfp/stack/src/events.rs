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

//! Inputs of the headset state machine.

use crate::address::RawAddress;
use crate::telephony::{CallState, ClccEntry, DeviceStatus};
use crate::timers::TimerId;
use crate::transport::TransportEvent;

/// Everything the state machine reacts to: local requests, telephony and media updates,
/// transport events, timer expiries and results of earlier actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Connect(RawAddress),
    Disconnect(RawAddress),
    /// Opens the audio link to the best candidate peer.
    ConnectAudio,
    DisconnectAudio,
    StartVoiceRecognition,
    StopVoiceRecognition,
    StartVirtualCall,
    StopVirtualCall,
    CallStateChanged { state: CallState, is_virtual: bool },
    DeviceStateChanged(DeviceStatus),
    SetCodecEnabled { addr: RawAddress, wideband: bool },
    /// Local speaker volume change of the voice stream.
    SetVolume(u8),
    SetAudioRouteAllowed(bool),
    SetForceScoAudio(bool),
    SendVendorResultCode { addr: RawAddress, command: String, arg: String },
    ClccResponse(ClccEntry),
    CallTypeChanged { cellular: bool },
    AudioServerRestarted,
    MediaConnectionChanged { addr: RawAddress, connected: bool },
    MediaPlaybackChanged { addr: RawAddress, playing: bool },
    Transport(TransportEvent),
    Timeout(TimerId),
    Outcome(Outcome),
    Shutdown,
}

/// Result of an action, fed back by the driver right after the action ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    ConnectFailed(RawAddress),
    DisconnectFailed(RawAddress),
    AudioConnectFailed(RawAddress),
    AudioDisconnectFailed(RawAddress),
    DialFailed(RawAddress),
    ChldResult { addr: RawAddress, ok: bool },
    SubscriberNumber { addr: RawAddress, number: Option<String> },
    OperatorName { addr: RawAddress, name: Option<String> },
    CurrentCallsUnavailable(RawAddress),
}
