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

//! Peer link arbitration: connect and disconnect requests, link events, admission, eviction
//! and the bounded reconnect.

use log::{debug, error, info, warn};

use super::{HeadsetStateMachine, HfpState, InFlight};
use crate::actions::{AudioAction, TelephonyAction, TransportAction};
use crate::address::RawAddress;
use crate::callbacks::ProfileConnectionState;
use crate::events::{Event, Outcome};
use crate::policy::Priority;
use crate::timers::TimerId;
use crate::transport::HfConnectionState;

impl HeadsetStateMachine {
    pub(super) fn on_connect_request(&mut self, addr: RawAddress) {
        if self.policy.priority(&addr) == Priority::Off {
            warn!("[{}]: connection priority is off, not connecting", addr);
            return;
        }

        match self.state {
            HfpState::Disconnected => {
                if !self.registry.begin_connect_attempt(addr) {
                    return;
                }
                self.notify_connection(
                    addr,
                    ProfileConnectionState::Disconnected,
                    ProfileConnectionState::Connecting,
                );
                self.transport(TransportAction::Connect(addr));
                self.registry.record_connect_attempt(addr);
                self.telephony(TelephonyAction::QueryPhoneState);
                self.roles.in_flight = InFlight::Target(addr);
                self.set_state(HfpState::Pending);
                self.start_timer(TimerId::Connect(addr));
            }
            HfpState::Pending | HfpState::MultiPending => self.defer(Event::Connect(addr)),
            HfpState::Connected | HfpState::AudioOn => {
                if self.connected.contains(&addr) {
                    info!("[{}]: already connected", addr);
                    return;
                }

                if self.state == HfpState::AudioOn && !self.config.multi_hf() {
                    // The only peer holds the audio link: close it, then replace the peer.
                    if let (Some(current), Some(audio)) =
                        (self.roles.current, self.roles.active_audio)
                    {
                        self.defer(Event::Disconnect(current));
                        self.defer(Event::Connect(addr));
                        self.transport(TransportAction::DisconnectAudio(audio));
                    }
                    return;
                }

                let evicted = if self.connected.is_full() {
                    match self.connected.oldest_except(self.roles.active_audio) {
                        Some(evicted) => Some(evicted),
                        None => {
                            warn!("[{}]: no peer can make room", addr);
                            return;
                        }
                    }
                } else {
                    None
                };
                if !self.registry.begin_connect_attempt(addr) {
                    return;
                }

                if let Some(evicted) = evicted {
                    info!("[{}]: at capacity, disconnecting {}", addr, evicted);
                    self.notify_connection(
                        addr,
                        ProfileConnectionState::Disconnected,
                        ProfileConnectionState::Connecting,
                    );
                    self.report_connection(evicted, ProfileConnectionState::Disconnecting);
                    self.roles.evicted = Some(evicted);
                    self.transport(TransportAction::Disconnect(evicted));
                } else {
                    self.notify_connection(
                        addr,
                        ProfileConnectionState::Disconnected,
                        ProfileConnectionState::Connecting,
                    );
                    self.transport(TransportAction::Connect(addr));
                }
                self.registry.record_connect_attempt(addr);
                self.roles.in_flight = InFlight::Target(addr);
                self.set_state(HfpState::MultiPending);
                self.start_timer(TimerId::Connect(addr));
            }
        }
    }

    pub(super) fn on_disconnect_request(&mut self, addr: RawAddress) {
        match self.state {
            HfpState::Disconnected => {
                if self.registry.retry_count(&addr).is_some() {
                    debug!("[{}]: dropping scheduled reconnect", addr);
                    self.cancel_timer(TimerId::ConnectRetry(addr));
                    self.registry.clear_retry(&addr);
                    self.registry.release(&addr);
                }
            }
            HfpState::Pending | HfpState::MultiPending => {
                if self.roles.in_flight.peer() == Some(addr) {
                    info!("[{}]: cancelling connection in flight", addr);
                    self.cancel_timer(TimerId::Connect(addr));
                    self.registry.clear_retry(&addr);
                    self.notify_connection(
                        addr,
                        ProfileConnectionState::Connecting,
                        ProfileConnectionState::Disconnected,
                    );
                    self.roles.in_flight = InFlight::None;
                    self.settle();
                    self.transport(TransportAction::Disconnect(addr));
                } else {
                    self.defer(Event::Disconnect(addr));
                }
            }
            HfpState::Connected | HfpState::AudioOn => {
                if !self.connected.contains(&addr) {
                    info!("[{}]: not connected, nothing to disconnect", addr);
                    return;
                }
                if self.roles.active_audio == Some(addr) {
                    // Audio goes first, the disconnect runs again once it is closed.
                    self.defer(Event::Disconnect(addr));
                    self.transport(TransportAction::DisconnectAudio(addr));
                    return;
                }
                self.report_connection(addr, ProfileConnectionState::Disconnecting);
                self.roles.evicted = Some(addr);
                if self.connected.len() > 1 {
                    self.set_state(HfpState::MultiPending);
                } else {
                    self.set_state(HfpState::Pending);
                }
                self.start_timer(TimerId::Connect(addr));
                self.transport(TransportAction::Disconnect(addr));
            }
        }
    }

    pub(super) fn on_connection_state(&mut self, addr: RawAddress, state: HfConnectionState) {
        debug!("[{}]: link {:?} in {:?}", addr, state, self.state);
        match state {
            HfConnectionState::Disconnected => self.on_link_disconnected(addr),
            HfConnectionState::Connecting | HfConnectionState::Connected => {
                self.on_link_connecting(addr)
            }
            HfConnectionState::SlcConnected => self.on_link_slc_connected(addr),
            HfConnectionState::Disconnecting => {
                if self.connected.contains(&addr)
                    && self.reported_state(&addr) == ProfileConnectionState::Connected
                {
                    self.report_connection(addr, ProfileConnectionState::Disconnecting);
                }
            }
        }
    }

    fn on_link_disconnected(&mut self, addr: RawAddress) {
        if self.connected.contains(&addr) {
            if self.roles.active_audio == Some(addr) {
                self.audio_link_lost(addr);
            }
            self.remove_connected(addr);
            self.report_connection(addr, ProfileConnectionState::Disconnected);

            if self.roles.evicted == Some(addr) {
                self.cancel_timer(TimerId::Connect(addr));
                self.roles.evicted = None;
                if let Some(target) = self.roles.target() {
                    if !self.connected.contains(&target) {
                        self.transport(TransportAction::Connect(target));
                    }
                }
            }
            self.settle();
        } else if self.roles.target() == Some(addr) {
            self.on_target_failed(addr);
        } else if self.roles.incoming() == Some(addr) {
            info!("[{}]: incoming connection dropped", addr);
            self.cancel_timer(TimerId::Connect(addr));
            self.notify_connection(
                addr,
                ProfileConnectionState::Connecting,
                ProfileConnectionState::Disconnected,
            );
            self.roles.in_flight = InFlight::None;
            self.settle();
        } else {
            warn!("[{}]: disconnected event for an unknown peer", addr);
        }
    }

    /// An outgoing connection failed. Schedules the single reconnect when this was the first
    /// attempt.
    fn on_target_failed(&mut self, addr: RawAddress) {
        warn!("[{}]: outgoing connection failed", addr);
        self.cancel_timer(TimerId::Connect(addr));
        if self.registry.retry_count(&addr) == Some(1) {
            self.start_timer(TimerId::ConnectRetry(addr));
        } else {
            self.registry.clear_retry(&addr);
        }
        if let Some(evicted) = self.roles.evicted {
            // The close issued to make room is still unconfirmed.
            self.start_timer(TimerId::Connect(evicted));
        }
        self.notify_connection(
            addr,
            ProfileConnectionState::Connecting,
            ProfileConnectionState::Disconnected,
        );
        self.roles.in_flight = InFlight::None;
        self.settle();
    }

    fn on_link_connecting(&mut self, addr: RawAddress) {
        if self.connected.contains(&addr) {
            if self.roles.evicted == Some(addr) {
                self.on_disconnect_failed(addr);
            } else {
                debug!("[{}]: already connected", addr);
            }
            return;
        }
        if self.roles.in_flight.peer() == Some(addr) {
            debug!("[{}]: link up, waiting for service level connection", addr);
            return;
        }
        if !self.admit_unsolicited(addr) {
            return;
        }
        if self.state == HfpState::Disconnected {
            info!("[{}]: incoming connection", addr);
            self.notify_connection(
                addr,
                ProfileConnectionState::Disconnected,
                ProfileConnectionState::Connecting,
            );
            self.roles.in_flight = InFlight::Incoming(addr);
            self.set_state(HfpState::Pending);
            self.start_timer(TimerId::Connect(addr));
        }
    }

    fn on_link_slc_connected(&mut self, addr: RawAddress) {
        if self.connected.contains(&addr) {
            debug!("[{}]: service level already up", addr);
            return;
        }
        if self.roles.in_flight.peer() == Some(addr) {
            self.cancel_timer(TimerId::Connect(addr));
            self.roles.in_flight = InFlight::None;
            self.on_slc_connected(addr, ProfileConnectionState::Connecting);
            self.settle();
            return;
        }
        if !self.admit_unsolicited(addr) {
            return;
        }
        self.on_slc_connected(addr, ProfileConnectionState::Disconnected);
        self.settle();
    }

    /// Admission check for a peer that isn't in any role. Rejected peers are disconnected.
    fn admit_unsolicited(&mut self, addr: RawAddress) -> bool {
        let in_flight = usize::from(self.roles.in_flight.peer().is_some());
        let leaving = usize::from(self.roles.evicted.is_some());
        let room = self.connected.len() + in_flight - leaving < self.config.max_connections;
        if !self.policy.ok_to_connect(&addr) || !room {
            warn!("[{}]: rejecting incoming connection (room: {})", addr, room);
            self.transport(TransportAction::Disconnect(addr));
            return false;
        }
        true
    }

    fn on_slc_connected(&mut self, addr: RawAddress, prev: ProfileConnectionState) {
        if !self.connected.push(addr) {
            error!("[{}]: no room for another service level connection", addr);
            self.transport(TransportAction::Disconnect(addr));
            self.notify_connection(addr, prev, ProfileConnectionState::Disconnected);
            return;
        }
        info!("[{}]: hfp slc connected.", addr);
        self.roles.current = Some(addr);
        self.registry.clear_retry(&addr);
        self.registry.reset_audio_params(addr);
        self.start_timer(TimerId::QueryPhoneState);

        self.media.reset_call_tracking();
        if self.phone.is_in_call() && self.media.is_connected() {
            self.media.set_suspended(true);
            self.audio(AudioAction::SuspendMedia(true));
        }

        if !self.config.multi_hf() && self.connected.len() == 1 {
            self.quirky_peer = self.quirks.is_quirky(&addr);
            if self.quirky_peer {
                info!("[{}]: delaying incoming call indicators for this peer", addr);
            }
        }
        self.notify_connection(addr, prev, ProfileConnectionState::Connected);
    }

    /// Drops `addr` from the connected set and moves roles off it.
    fn remove_connected(&mut self, addr: RawAddress) {
        self.connected.remove(&addr);
        if self.roles.active_audio == Some(addr) {
            self.roles.active_audio = None;
        }
        if self.roles.current == Some(addr) {
            self.roles.current = self.connected.last();
        }
        if self.roles.active_audio.is_none() {
            self.audio(AudioAction::Wideband(false));
        }
    }

    /// The connect timer bounds every transitional role. A stalled peer is handled as if the
    /// transport had reported it disconnected.
    pub(super) fn on_connect_timeout(&mut self, addr: RawAddress) {
        if self.roles.in_flight.peer() == Some(addr) {
            warn!("[{}]: connection timed out", addr);
            let evicted = self.roles.evicted;
            self.on_link_disconnected(addr);
            // The peer closed to make room never confirmed either.
            if let Some(evicted) = evicted.filter(|e| self.roles.evicted == Some(*e)) {
                warn!("[{}]: disconnect timed out", evicted);
                self.on_link_disconnected(evicted);
            }
        } else if self.roles.evicted == Some(addr) && self.connected.contains(&addr) {
            warn!("[{}]: disconnect timed out", addr);
            self.on_link_disconnected(addr);
        } else {
            debug!("[{}]: connect timeout for a peer no longer in flight", addr);
        }
    }

    /// A disconnect didn't happen: the peer stays connected and any connection waiting for its
    /// slot is abandoned.
    fn on_disconnect_failed(&mut self, addr: RawAddress) {
        warn!("[{}]: disconnect failed, still connected", addr);
        self.cancel_timer(TimerId::Connect(addr));
        self.notify_connection(
            addr,
            ProfileConnectionState::Disconnecting,
            ProfileConnectionState::Connected,
        );
        self.roles.evicted = None;
        if let Some(target) = self.roles.target() {
            self.cancel_timer(TimerId::Connect(target));
            self.registry.rollback_connect_attempt(&target);
            self.notify_connection(
                target,
                ProfileConnectionState::Connecting,
                ProfileConnectionState::Disconnected,
            );
            self.roles.in_flight = InFlight::None;
        }
        self.settle();
    }

    pub(super) fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::ConnectFailed(addr) => {
                if self.roles.target() != Some(addr) {
                    warn!("[{}]: connect failed for a peer no longer connecting", addr);
                    return;
                }
                error!("[{}]: could not start connection", addr);
                self.cancel_timer(TimerId::Connect(addr));
                self.registry.rollback_connect_attempt(&addr);
                self.notify_connection(
                    addr,
                    ProfileConnectionState::Connecting,
                    ProfileConnectionState::Disconnected,
                );
                self.roles.in_flight = InFlight::None;
                self.settle();
            }
            Outcome::DisconnectFailed(addr) => {
                if self.connected.contains(&addr) && self.roles.evicted == Some(addr) {
                    self.on_disconnect_failed(addr);
                } else {
                    warn!("[{}]: disconnect failed", addr);
                }
            }
            Outcome::AudioConnectFailed(addr) => {
                error!("[{}]: could not open audio", addr);
                self.vr.pending_sco = None;
            }
            Outcome::AudioDisconnectFailed(addr) => {
                error!("[{}]: could not close audio", addr);
                // Requests waiting for the audio link to close can't proceed.
                self.deferred.retain(|e| match e {
                    Event::Disconnect(a) => *a != addr,
                    Event::Connect(_) => false,
                    _ => true,
                });
            }
            Outcome::DialFailed(addr) => self.on_dial_failed(addr),
            Outcome::ChldResult { addr, ok } => self.at_response(addr, ok),
            Outcome::SubscriberNumber { addr, number } => self.on_subscriber_number(addr, number),
            Outcome::OperatorName { addr, name } => self.on_operator_name(addr, name),
            Outcome::CurrentCallsUnavailable(addr) => self.on_current_calls_timeout(addr),
        }
    }
}
