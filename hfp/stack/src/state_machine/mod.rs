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

//! The headset state machine.
//!
//! One coarse machine arbitrates every peer link, the single audio link and the call indicators.
//! `HeadsetStateMachine::process` takes one `Event`, updates the in-memory model and returns
//! the `Action`s the driver has to run. It never performs I/O itself.
//!
//! Events that can't be handled mid-transition are deferred and handed back through
//! `take_replay` after the next state change, oldest first.

use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt::Write;

use crate::actions::{Action, AudioAction, Notification, TelephonyAction, TransportAction};
use crate::address::RawAddress;
use crate::call_sync::{CallSynchronizer, MediaSync};
use crate::callbacks::{AudioState, ProfileConnectionState};
use crate::config::HfpConfig;
use crate::events::Event;
use crate::policy::{IPeerPolicy, IQuirkyPeer};
use crate::registry::{DeviceRegistry, PeerSubState};
use crate::sco::{ScoSession, VoiceRecognition};
use crate::telephony::PhoneState;
use crate::timers::TimerId;
use crate::transport::{AtResponse, HfAudioState, TransportEvent};

mod audio;
mod call;
mod connection;


/// Arbitrator states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HfpState {
    /// No peer is connected or connecting.
    Disconnected,
    /// A first peer is connecting, or the last one is disconnecting.
    Pending,
    Connected,
    /// Connected with the audio link up.
    AudioOn,
    /// At least one peer is connected while another one is connecting or disconnecting.
    MultiPending,
}

/// Connection in flight, either initiated locally or by the peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InFlight {
    #[default]
    None,
    Target(RawAddress),
    Incoming(RawAddress),
}

impl InFlight {
    pub fn peer(&self) -> Option<RawAddress> {
        match self {
            InFlight::None => None,
            InFlight::Target(addr) | InFlight::Incoming(addr) => Some(*addr),
        }
    }
}

/// Role assignment. Only the state machine updates roles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roles {
    current: Option<RawAddress>,
    in_flight: InFlight,
    active_audio: Option<RawAddress>,
    evicted: Option<RawAddress>,
}

impl Roles {
    /// Last peer that completed service level setup. Default target for audio and calls.
    pub fn current(&self) -> Option<RawAddress> {
        self.current
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight
    }

    pub fn target(&self) -> Option<RawAddress> {
        match self.in_flight {
            InFlight::Target(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn incoming(&self) -> Option<RawAddress> {
        match self.in_flight {
            InFlight::Incoming(addr) => Some(addr),
            _ => None,
        }
    }

    /// Peer holding the audio link.
    pub fn active_audio(&self) -> Option<RawAddress> {
        self.active_audio
    }

    /// Peer being disconnected, to make room or on request.
    pub fn evicted(&self) -> Option<RawAddress> {
        self.evicted
    }
}

/// Peers with a service level connection, oldest first.
#[derive(Clone, Debug)]
pub struct ConnectedPeers {
    peers: Vec<RawAddress>,
    capacity: usize,
}

impl ConnectedPeers {
    fn new(capacity: usize) -> Self {
        Self { peers: Vec::with_capacity(capacity), capacity }
    }

    pub fn contains(&self, addr: &RawAddress) -> bool {
        self.peers.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawAddress> {
        self.peers.iter()
    }

    pub fn last(&self) -> Option<RawAddress> {
        self.peers.last().copied()
    }

    /// Oldest peer other than `skip`.
    pub fn oldest_except(&self, skip: Option<RawAddress>) -> Option<RawAddress> {
        self.peers.iter().copied().find(|p| Some(*p) != skip)
    }

    fn push(&mut self, addr: RawAddress) -> bool {
        if self.contains(&addr) || self.is_full() {
            return false;
        }
        self.peers.push(addr);
        true
    }

    fn remove(&mut self, addr: &RawAddress) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != addr);
        self.peers.len() != before
    }

    fn clear(&mut self) {
        self.peers.clear();
    }
}

pub struct HeadsetStateMachine {
    config: HfpConfig,
    state: HfpState,
    roles: Roles,
    connected: ConnectedPeers,
    registry: DeviceRegistry,
    policy: Box<dyn IPeerPolicy + Send>,
    quirks: Box<dyn IQuirkyPeer + Send>,
    phone: PhoneState,
    sync: CallSynchronizer,
    media: MediaSync,
    sco: ScoSession,
    vr: VoiceRecognition,
    virtual_call: bool,
    /// Peer waiting for its dial request to be confirmed.
    dialing_out: Option<RawAddress>,
    /// Peer waiting for a current calls listing.
    clcc_requester: Option<RawAddress>,
    quirky_peer: bool,
    call_ind_delay: bool,
    deferred: VecDeque<Event>,
    replay_ready: bool,
    actions: Vec<Action>,
}

impl HeadsetStateMachine {
    pub fn new(
        config: HfpConfig,
        policy: Box<dyn IPeerPolicy + Send>,
        quirks: Box<dyn IQuirkyPeer + Send>,
    ) -> Self {
        let capacity = config.max_connections;
        Self {
            config,
            state: HfpState::Disconnected,
            roles: Roles::default(),
            connected: ConnectedPeers::new(capacity),
            registry: DeviceRegistry::new(),
            policy,
            quirks,
            phone: PhoneState::default(),
            sync: CallSynchronizer::new(),
            media: MediaSync::new(),
            sco: ScoSession::new(),
            vr: VoiceRecognition::default(),
            virtual_call: false,
            dialing_out: None,
            clcc_requester: None,
            quirky_peer: false,
            call_ind_delay: false,
            deferred: VecDeque::new(),
            replay_ready: false,
            actions: vec![],
        }
    }

    /// Handles one event and returns the actions to run, in order.
    pub fn process(&mut self, event: Event) -> Vec<Action> {
        debug!("{:?}: processing {:?}", self.state, event);
        self.handle(event);
        std::mem::take(&mut self.actions)
    }

    /// Deferred events to run again, oldest first. Empty unless the state changed since the
    /// last call.
    pub fn take_replay(&mut self) -> Vec<Event> {
        if !self.replay_ready {
            return vec![];
        }
        self.replay_ready = false;
        self.deferred.drain(..).collect()
    }

    pub fn state(&self) -> HfpState {
        self.state
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn config(&self) -> &HfpConfig {
        &self.config
    }

    pub fn phone(&self) -> &PhoneState {
        &self.phone
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn connected_devices(&self) -> Vec<RawAddress> {
        self.connected.iter().copied().collect()
    }

    pub fn is_virtual_call(&self) -> bool {
        self.virtual_call
    }

    pub fn is_voice_recognition_active(&self) -> bool {
        self.vr.is_active()
    }

    pub fn get_connection_state(&self, addr: &RawAddress) -> ProfileConnectionState {
        let in_flight = self.roles.in_flight.peer() == Some(*addr);
        let connected = self.connected.contains(addr);
        match self.state {
            HfpState::Disconnected => ProfileConnectionState::Disconnected,
            HfpState::Pending | HfpState::MultiPending if in_flight => {
                ProfileConnectionState::Connecting
            }
            HfpState::Pending | HfpState::MultiPending if self.roles.evicted == Some(*addr) => {
                ProfileConnectionState::Disconnecting
            }
            HfpState::Pending if connected => ProfileConnectionState::Disconnecting,
            HfpState::Connected | HfpState::AudioOn | HfpState::MultiPending if connected => {
                ProfileConnectionState::Connected
            }
            _ => ProfileConnectionState::Disconnected,
        }
    }

    /// Bonded or known peers currently in one of `states`.
    pub fn get_devices_matching_connection_states(
        &self,
        states: &[ProfileConnectionState],
    ) -> Vec<RawAddress> {
        self.policy
            .bonded_devices()
            .into_iter()
            .chain(self.registry.addresses())
            .chain(self.connected.iter().copied())
            .sorted()
            .dedup()
            .filter(|a| states.contains(&self.get_connection_state(a)))
            .collect()
    }

    pub fn get_audio_state(&self, addr: &RawAddress) -> AudioState {
        if self.roles.active_audio != Some(*addr) {
            return AudioState::Disconnected;
        }
        match self.sco.audio_state {
            HfAudioState::Connected => AudioState::Connected,
            HfAudioState::Connecting => AudioState::Connecting,
            _ => AudioState::Disconnected,
        }
    }

    pub fn is_audio_on(&self) -> bool {
        self.roles.active_audio.is_some() && self.sco.is_connected()
    }

    pub fn is_audio_connected(&self, addr: &RawAddress) -> bool {
        self.roles.active_audio == Some(*addr) && self.sco.is_connected()
    }

    /// Human readable snapshot of the machine.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let peers: Vec<String> = self.connected.iter().map(|p| p.to_string()).collect();
        let _ = writeln!(out, "state: {:?}", self.state);
        let capacity = self.connected.capacity;
        let _ = writeln!(out, "connected: [{}] (max {})", peers.join(", "), capacity);
        let _ = writeln!(out, "current: {:?}", self.roles.current);
        let _ = writeln!(out, "in flight: {:?}", self.roles.in_flight);
        let _ = writeln!(out, "evicted: {:?}", self.roles.evicted);
        let _ = writeln!(
            out,
            "active audio: {:?} ({:?})",
            self.roles.active_audio, self.sco.audio_state
        );
        let _ = writeln!(out, "call: {:?} cellular: {}", self.phone.call, self.phone.is_cs_call);
        let _ = writeln!(out, "call queue: {:?}", self.sync.state());
        let _ = writeln!(
            out,
            "virtual call: {} voice recognition: {} (waiting {:?})",
            self.virtual_call, self.vr.started, self.vr.waiting
        );
        let _ = writeln!(
            out,
            "media suspended: {} pending indicators: {}",
            self.media.is_suspended(),
            self.media.pending_ciev()
        );
        let _ = writeln!(
            out,
            "force sco: {} route allowed: {} deferred: {}",
            self.sco.force,
            self.sco.route_allowed,
            self.deferred.len()
        );
        out
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Connect(addr) => self.on_connect_request(addr),
            Event::Disconnect(addr) => self.on_disconnect_request(addr),
            Event::ConnectAudio => self.on_connect_audio_request(),
            Event::DisconnectAudio => self.on_disconnect_audio_request(),
            Event::StartVoiceRecognition => self.on_start_voice_recognition(),
            Event::StopVoiceRecognition => self.on_stop_voice_recognition(),
            Event::StartVirtualCall => {
                self.start_virtual_call();
            }
            Event::StopVirtualCall => {
                self.terminate_virtual_call();
            }
            Event::CallStateChanged { state, is_virtual } => {
                self.on_call_state_changed(state, is_virtual)
            }
            Event::DeviceStateChanged(status) => self.on_device_state_changed(status),
            Event::SetCodecEnabled { addr, wideband } => self.on_set_codec(addr, wideband),
            Event::SetVolume(volume) => self.on_local_volume(volume),
            Event::SetAudioRouteAllowed(allowed) => self.sco.route_allowed = allowed,
            Event::SetForceScoAudio(force) => self.sco.force = force,
            Event::SendVendorResultCode { addr, command, arg } => {
                self.send_vendor_result_code(addr, &command, &arg)
            }
            Event::ClccResponse(entry) => self.on_clcc_response(entry),
            Event::CallTypeChanged { cellular } => self.on_call_type_changed(cellular),
            Event::AudioServerRestarted => self.on_audio_server_restarted(),
            Event::MediaConnectionChanged { addr, connected } => {
                self.media.set_connected(addr, connected)
            }
            Event::MediaPlaybackChanged { addr, playing } => {
                self.on_media_playback_changed(addr, playing)
            }
            Event::Transport(event) => self.on_transport_event(event),
            Event::Timeout(id) => self.on_timeout(id),
            Event::Outcome(outcome) => self.on_outcome(outcome),
            Event::Shutdown => self.shutdown(),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionStateChanged { addr, state } => {
                self.on_connection_state(addr, state)
            }
            TransportEvent::AudioStateChanged { addr, state } => self.on_audio_state(addr, state),
            TransportEvent::FeaturesReported { addr, features } => {
                if self.registry.set_features(&addr, features) {
                    debug!("[{}]: features {:?}", addr, features);
                } else {
                    warn!("[{}]: features reported by an unknown peer", addr);
                }
            }
            TransportEvent::CodecNegotiated { addr, codec } => {
                self.on_codec_negotiated(addr, codec)
            }
            event => {
                let addr = event.addr();
                if !self.connected.contains(&addr) {
                    warn!("[{}]: ignoring {:?} from a peer that isn't connected", addr, event);
                    return;
                }
                match event {
                    TransportEvent::VoiceRecognitionChanged { addr, started } => {
                        self.on_remote_voice_recognition(addr, started)
                    }
                    TransportEvent::NoiseReductionChanged { addr, enabled } => {
                        self.on_noise_reduction(addr, enabled)
                    }
                    TransportEvent::VolumeChanged { addr, kind, volume } => {
                        self.on_remote_volume(addr, kind, volume)
                    }
                    TransportEvent::CallControl { addr, request } => {
                        self.on_call_control(addr, request)
                    }
                    TransportEvent::IndicatorQuery { addr, query } => {
                        self.on_indicator_query(addr, query)
                    }
                    TransportEvent::UnknownCommand { addr, raw } => self.on_unknown_at(addr, &raw),
                    _ => {}
                }
            }
        }
    }

    fn on_timeout(&mut self, id: TimerId) {
        match id {
            TimerId::Connect(addr) => self.on_connect_timeout(addr),
            TimerId::ConnectRetry(addr) => {
                info!("[{}]: retrying connection", addr);
                self.handle(Event::Connect(addr));
            }
            TimerId::Dialing(addr) => self.on_dial_failed(addr),
            TimerId::VoiceRecognitionStart(addr) => self.on_voice_recognition_timeout(addr),
            TimerId::CurrentCalls(addr) => self.on_current_calls_timeout(addr),
            TimerId::QueryPhoneState => self.telephony(TelephonyAction::QueryPhoneState),
            TimerId::IncomingCallIndication => self.send_incoming_call_indication(),
            TimerId::CallAlerting => {
                let steps = self.sync.on_alerting_timeout();
                self.apply_sync_steps(steps);
            }
            TimerId::CallActive => {
                let steps = self.sync.on_active_timeout();
                self.apply_sync_steps(steps);
            }
            TimerId::VirtualAlerting => self.on_virtual_alerting(),
            TimerId::VirtualActive => self.on_virtual_active(),
        }
    }

    fn set_state(&mut self, next: HfpState) {
        if self.state == next {
            return;
        }
        info!("{:?} -> {:?}", self.state, next);
        self.state = next;
        self.replay_ready = true;
        if next == HfpState::Disconnected {
            self.vr.reset();
            self.dialing_out = None;
            self.quirky_peer = false;
            self.roles = Roles::default();
        }
    }

    fn defer(&mut self, event: Event) {
        debug!("{:?}: deferring {:?}", self.state, event);
        self.deferred.push_back(event);
    }

    fn is_connected_state(&self) -> bool {
        matches!(self.state, HfpState::Connected | HfpState::AudioOn | HfpState::MultiPending)
    }

    fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn transport(&mut self, action: TransportAction) {
        self.push(Action::Transport(action));
    }

    fn audio(&mut self, action: AudioAction) {
        self.push(Action::Audio(action));
    }

    fn telephony(&mut self, action: TelephonyAction) {
        self.push(Action::Telephony(action));
    }

    fn at_response(&mut self, addr: RawAddress, ok: bool) {
        let code = if ok { AtResponse::Ok } else { AtResponse::Error };
        self.transport(TransportAction::AtResponse(addr, code));
    }

    fn start_timer(&mut self, id: TimerId) {
        let t = &self.config.timeouts;
        let delay = match id {
            TimerId::Connect(_) => t.connect,
            TimerId::ConnectRetry(_) => t.connect_retry,
            TimerId::Dialing(_) => t.dialing,
            TimerId::VoiceRecognitionStart(_) => t.voice_recognition_start,
            TimerId::CurrentCalls(_) => t.current_calls_response,
            TimerId::QueryPhoneState => t.query_phone_state,
            TimerId::IncomingCallIndication => t.incoming_call_indication,
            TimerId::CallAlerting => t.call_alerting,
            TimerId::CallActive => t.call_active,
            TimerId::VirtualAlerting => t.virtual_call_alerting,
            TimerId::VirtualActive => t.virtual_call_active,
        };
        self.push(Action::StartTimer(id, delay));
    }

    fn cancel_timer(&mut self, id: TimerId) {
        self.push(Action::CancelTimer(id));
    }

    /// Connection state last reported for `addr`.
    fn reported_state(&self, addr: &RawAddress) -> ProfileConnectionState {
        match self.registry.sub_state(addr) {
            PeerSubState::None => ProfileConnectionState::Disconnected,
            PeerSubState::Connecting => ProfileConnectionState::Connecting,
            PeerSubState::ServiceLevelUp => ProfileConnectionState::Connected,
            PeerSubState::Disconnecting => ProfileConnectionState::Disconnecting,
        }
    }

    /// Reports a connection state change to observers and mirrors it in the registry.
    fn notify_connection(
        &mut self,
        addr: RawAddress,
        prev: ProfileConnectionState,
        state: ProfileConnectionState,
    ) {
        info!("[{}]: connection state {:?} -> {:?}", addr, prev, state);
        let sub_state = match state {
            ProfileConnectionState::Disconnected => PeerSubState::None,
            ProfileConnectionState::Connecting => PeerSubState::Connecting,
            ProfileConnectionState::Connected => PeerSubState::ServiceLevelUp,
            ProfileConnectionState::Disconnecting => PeerSubState::Disconnecting,
        };
        self.registry.set_sub_state(addr, sub_state);
        if sub_state == PeerSubState::None {
            self.registry.release(&addr);
        }
        self.push(Action::Notify(Notification::ConnectionState { addr, prev, state }));
    }

    /// Same as `notify_connection`, taking the previous state from the registry.
    fn report_connection(&mut self, addr: RawAddress, state: ProfileConnectionState) {
        let prev = self.reported_state(&addr);
        self.notify_connection(addr, prev, state);
    }

    fn notify_audio(&mut self, addr: RawAddress, prev: AudioState, state: AudioState) {
        info!("[{}]: audio state {:?} -> {:?}", addr, prev, state);
        self.push(Action::Notify(Notification::AudioState { addr, prev, state }));
    }

    /// Leaves the transitional states once nothing is in flight.
    fn settle(&mut self) {
        if self.roles.in_flight == InFlight::None && self.roles.evicted.is_none() {
            self.resolve_stable();
        }
    }

    fn resolve_stable(&mut self) {
        let next = if self.connected.is_empty() {
            HfpState::Disconnected
        } else if self.is_audio_on() {
            HfpState::AudioOn
        } else {
            HfpState::Connected
        };
        self.set_state(next);
    }

    fn shutdown(&mut self) {
        info!("Shutting down, {} peer(s) connected", self.connected.len());
        if let Some(addr) = self.roles.active_audio {
            self.audio(AudioAction::ScoRoute(false));
            if !self.phone.is_cs_call {
                self.audio(AudioAction::VoipSession(false));
            }
            self.notify_audio(addr, AudioState::Connected, AudioState::Disconnected);
        }
        if let Some(addr) = self.roles.in_flight.peer() {
            self.notify_connection(
                addr,
                ProfileConnectionState::Connecting,
                ProfileConnectionState::Disconnected,
            );
        }
        for addr in self.connected_devices() {
            self.notify_connection(
                addr,
                ProfileConnectionState::Connected,
                ProfileConnectionState::Disconnected,
            );
        }
        if self.sco.silence_playing {
            self.sco.silence_playing = false;
            self.audio(AudioAction::StopSilence);
        }

        self.connected.clear();
        self.registry.clear();
        self.deferred.clear();
        self.sync = CallSynchronizer::new();
        self.sco.audio_state = HfAudioState::Disconnected;
        self.sco.clear_remembered();
        self.virtual_call = false;
        self.clcc_requester = None;
        self.set_state(HfpState::Disconnected);
        self.roles = Roles::default();
        self.replay_ready = false;
    }
}
