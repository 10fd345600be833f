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

//! Calls: indicator ordering, virtual calls, call control from peers, indicator queries,
//! vendor commands and music stream coordination.

use log::{debug, info, warn};

use super::{HeadsetStateMachine, HfpState};
use crate::actions::{
    Action, AudioAction, DialTarget, Notification, TelephonyAction, TransportAction,
};
use crate::address::RawAddress;
use crate::call_sync::SyncStep;
use crate::callbacks::company_id;
use crate::telephony::{
    CallDirection, CallMode, CallPhase, CallState, ClccEntry, ClccStatus, DeviceStatus,
};
use crate::timers::TimerId;
use crate::transport::{CallControl, CindResponse, IndicatorQuery};

/// Number reported for a virtual call in current-calls listings.
const VIRTUAL_CALL_NUMBER: &str = "10000000";

/// Type-of-address values.
const TOA_UNKNOWN: u32 = 129;
const TOA_INTERNATIONAL: u32 = 145;

/// Upper-cases a raw AT command outside of quoted strings and drops whitespace there.
pub(crate) fn normalize_at(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quoted = false;
    for c in raw.chars() {
        if c == '"' {
            quoted = !quoted;
            out.push(c);
        } else if quoted {
            out.push(c);
        } else if !c.is_whitespace() {
            out.extend(c.to_uppercase());
        }
    }
    out
}

fn vendor_company_id(command: &str) -> Option<u32> {
    match command {
        "+XEVENT" => Some(company_id::PLANTRONICS),
        "+ANDROID" => Some(company_id::GOOGLE),
        "+XAPL" | "+IPHONEACCEV" => Some(company_id::APPLE),
        _ => None,
    }
}

fn clcc_status(phase: CallPhase) -> ClccStatus {
    match phase {
        CallPhase::Dialing => ClccStatus::Dialing,
        CallPhase::Alerting => ClccStatus::Alerting,
        CallPhase::Incoming => ClccStatus::Incoming,
        CallPhase::Idle => ClccStatus::Active,
    }
}

impl HeadsetStateMachine {
    pub(super) fn on_call_state_changed(&mut self, state: CallState, is_virtual: bool) {
        if self.is_connected_state() && !is_virtual && !self.virtual_call {
            let steps = self.sync.on_call_state_changed(&self.phone.call, state);
            self.apply_sync_steps(steps);
        } else {
            self.process_call_state(state, is_virtual);
        }
    }

    pub(super) fn apply_sync_steps(&mut self, steps: Vec<SyncStep>) {
        for step in steps {
            match step {
                SyncStep::Forward(state) => self.process_call_state(state, false),
                SyncStep::ArmAlerting => self.start_timer(TimerId::CallAlerting),
                SyncStep::ArmActive => self.start_timer(TimerId::CallActive),
                SyncStep::CancelAlerting => self.cancel_timer(TimerId::CallAlerting),
                SyncStep::CancelActive => self.cancel_timer(TimerId::CallActive),
            }
        }
    }

    /// Records a call update and forwards it to peers.
    fn process_call_state(&mut self, mut state: CallState, is_virtual: bool) {
        if !is_virtual && self.virtual_call {
            let cellular_idle =
                state.num_active == 0 && state.num_held == 0 && state.phase == CallPhase::Idle;
            if cellular_idle {
                // Keep reporting the virtual call as active.
                state.num_active = 1;
            } else {
                self.terminate_virtual_call();
            }
        }

        let prev = &self.phone.call;
        if self.quirky_peer
            && prev.num_active == 1
            && state.num_active == 0
            && state.num_held == 0
            && state.phase == CallPhase::Incoming
        {
            info!("Reporting idle before the waiting call");
            if let Some(addr) = self.roles.active_audio {
                self.transport(TransportAction::DisconnectAudio(addr));
            }
            let idle = CallState::idle().with_number(state.number.clone(), state.number_type);
            self.transport(TransportAction::PhoneState(idle));
            self.call_ind_delay = true;
        }

        self.phone.call = state.clone();

        if let Some(addr) = self.dialing_out {
            if state.phase == CallPhase::Dialing {
                debug!("[{}]: dial confirmed", addr);
                self.cancel_timer(TimerId::Dialing(addr));
                self.dialing_out = None;
                self.at_response(addr, true);
            }
        }

        self.process_media_state(state);
    }

    /// Holds call indicators back while the music stream still plays, sends them otherwise.
    fn process_media_state(&mut self, state: CallState) {
        if self.phone.is_in_call() && !self.connected.is_empty() && self.media.is_connected() {
            if !self.media.is_suspended() {
                debug!("Suspending music for the call");
                self.media.set_suspended(true);
                self.audio(AudioAction::SuspendMedia(true));
            }
            if self.media.is_playing() && !self.virtual_call {
                debug!("Music still playing, holding {:?}", state);
                self.media.cache(state);
                return;
            }
        }

        if self.state != HfpState::Disconnected {
            if self.call_ind_delay {
                self.call_ind_delay = false;
                self.start_timer(TimerId::IncomingCallIndication);
            } else {
                self.transport(TransportAction::PhoneState(state.clone()));
            }
        }

        if self.media.is_suspended()
            && !self.is_audio_on()
            && !self.phone.is_in_call()
            && state.number.is_empty()
        {
            self.media.set_suspended(false);
            self.audio(AudioAction::SuspendMedia(false));
        }
    }

    pub(super) fn send_incoming_call_indication(&mut self) {
        let call = &self.phone.call;
        let incoming = CallState::new(0, 0, CallPhase::Incoming)
            .with_number(call.number.clone(), call.number_type);
        self.transport(TransportAction::PhoneState(incoming));
    }

    pub(super) fn start_virtual_call(&mut self) -> bool {
        if !self.is_connected_state() {
            warn!("No peer connected for a virtual call");
            return false;
        }
        if self.virtual_call || self.phone.is_in_call() || self.vr.is_active() {
            warn!("Virtual call refused: a call or voice recognition is in progress");
            return false;
        }
        info!("Starting virtual call");
        self.virtual_call = true;
        self.audio(AudioAction::VoipSession(true));

        if self.media.is_connected() {
            if !self.media.is_suspended() {
                self.media.set_suspended(true);
                self.audio(AudioAction::SuspendMedia(true));
            }
            if self.media.is_playing() {
                self.media.set_pending_ciev();
                return true;
            }
        }
        self.start_virtual_sequence();
        true
    }

    fn start_virtual_sequence(&mut self) {
        self.process_call_state(CallState::new(0, 0, CallPhase::Dialing), true);
        self.start_timer(TimerId::VirtualAlerting);
        self.start_timer(TimerId::VirtualActive);
    }

    pub(super) fn on_virtual_alerting(&mut self) {
        if self.virtual_call {
            self.process_call_state(CallState::new(0, 0, CallPhase::Alerting), true);
        }
    }

    pub(super) fn on_virtual_active(&mut self) {
        if self.virtual_call {
            self.process_call_state(CallState::new(1, 0, CallPhase::Idle), true);
        }
    }

    /// Ends the virtual call. Returns false if there was none.
    pub(super) fn terminate_virtual_call(&mut self) -> bool {
        if !self.virtual_call {
            return false;
        }
        info!("Terminating virtual call");
        self.cancel_timer(TimerId::VirtualAlerting);
        self.cancel_timer(TimerId::VirtualActive);
        self.process_call_state(CallState::idle(), true);
        self.virtual_call = false;
        self.audio(AudioAction::VoipSession(false));
        true
    }

    pub(super) fn on_call_control(&mut self, addr: RawAddress, request: CallControl) {
        match request {
            CallControl::Answer => self.answer_call(addr),
            CallControl::Hangup => self.hangup_call(),
            CallControl::Dial(number) => self.dial(addr, &number),
            CallControl::SendDtmf(code) => self.telephony(TelephonyAction::SendDtmf(code)),
            CallControl::KeyPress => self.on_key_press(addr),
            CallControl::Chld(chld) => self.telephony(TelephonyAction::Chld { addr, chld }),
            CallControl::SubscriberNumber => {
                self.telephony(TelephonyAction::SubscriberNumber(addr))
            }
        }
    }

    fn answer_call(&mut self, addr: RawAddress) {
        self.sco.set_sco_requested(addr);
        self.telephony(TelephonyAction::Answer);
    }

    fn hangup_call(&mut self) {
        if !self.terminate_virtual_call() {
            self.telephony(TelephonyAction::Hangup);
        }
    }

    fn dial(&mut self, addr: RawAddress, number: &str) {
        if self.dialing_out.is_some() {
            warn!("[{}]: already dialing", addr);
            self.at_response(addr, false);
            return;
        }
        let target = if number.is_empty() {
            DialTarget::LastDialed
        } else if number.starts_with('>') {
            // Memory dialing falls back to the last dialed number.
            if number.starts_with(">9999") {
                self.at_response(addr, false);
                return;
            }
            DialTarget::LastDialed
        } else {
            DialTarget::Number(number.strip_suffix(';').unwrap_or(number).to_string())
        };
        self.place_call(addr, target);
    }

    fn place_call(&mut self, addr: RawAddress, target: DialTarget) {
        self.terminate_virtual_call();
        self.sco.set_sco_requested(addr);
        self.telephony(TelephonyAction::Dial { addr, target });
        self.dialing_out = Some(addr);
        self.start_timer(TimerId::Dialing(addr));
    }

    pub(super) fn on_dial_failed(&mut self, addr: RawAddress) {
        if self.dialing_out != Some(addr) {
            return;
        }
        warn!("[{}]: dial failed", addr);
        self.cancel_timer(TimerId::Dialing(addr));
        self.dialing_out = None;
        self.at_response(addr, false);
    }

    fn on_key_press(&mut self, addr: RawAddress) {
        if self.phone.is_ringing() {
            self.answer_call(addr);
        } else if self.phone.call.num_active > 0 {
            if self.is_audio_on() {
                self.hangup_call();
            } else {
                self.transport(TransportAction::ConnectAudio(addr));
            }
        } else if self.dialing_out.is_some() {
            debug!("[{}]: key press while dialing", addr);
        } else {
            self.place_call(addr, DialTarget::LastDialed);
        }
    }

    pub(super) fn on_indicator_query(&mut self, addr: RawAddress, query: IndicatorQuery) {
        match query {
            IndicatorQuery::CurrentState => {
                let call = &self.phone.call;
                let phase =
                    if self.sync.alerting_queued() { CallPhase::Dialing } else { call.phase };
                let device = self.phone.device;
                let cind = CindResponse {
                    service: device.service,
                    num_active: if self.virtual_call { 1 } else { call.num_active },
                    num_held: if self.virtual_call { 0 } else { call.num_held },
                    call_setup: if self.virtual_call { 0 } else { phase as u32 },
                    signal: device.signal,
                    roam: device.roam,
                    battery: device.battery,
                };
                self.transport(TransportAction::Cind(addr, cind));
            }
            IndicatorQuery::OperatorName => self.telephony(TelephonyAction::OperatorName(addr)),
            IndicatorQuery::CurrentCalls => {
                if self.virtual_call {
                    let call = &self.phone.call;
                    let status = match call.num_active {
                        0 => clcc_status(call.phase),
                        _ => ClccStatus::Active,
                    };
                    let entry = ClccEntry {
                        index: 1,
                        direction: CallDirection::Outgoing,
                        status,
                        mode: CallMode::Voice,
                        multiparty: false,
                        number: VIRTUAL_CALL_NUMBER.to_string(),
                        number_type: TOA_UNKNOWN,
                    };
                    self.transport(TransportAction::Clcc(addr, entry));
                    self.transport(TransportAction::Clcc(addr, ClccEntry::terminator()));
                } else {
                    self.clcc_requester = Some(addr);
                    self.telephony(TelephonyAction::ListCurrentCalls(addr));
                    self.start_timer(TimerId::CurrentCalls(addr));
                }
            }
        }
    }

    pub(super) fn on_clcc_response(&mut self, mut entry: ClccEntry) {
        let Some(addr) = self.clcc_requester else {
            warn!("Current call entry without a request: {:?}", entry);
            return;
        };
        if entry.is_terminator() {
            self.cancel_timer(TimerId::CurrentCalls(addr));
            self.clcc_requester = None;
        }
        if entry.status == ClccStatus::Alerting && self.sync.alerting_queued() {
            entry.status = ClccStatus::Dialing;
        }
        self.transport(TransportAction::Clcc(addr, entry));
    }

    pub(super) fn on_current_calls_timeout(&mut self, addr: RawAddress) {
        if self.clcc_requester != Some(addr) {
            return;
        }
        warn!("[{}]: current calls listing unavailable", addr);
        self.clcc_requester = None;
        self.cancel_timer(TimerId::CurrentCalls(addr));
        self.transport(TransportAction::Clcc(addr, ClccEntry::terminator()));
    }

    pub(super) fn on_subscriber_number(&mut self, addr: RawAddress, number: Option<String>) {
        match number.filter(|n| !n.is_empty()) {
            Some(number) => {
                let toa = if number.starts_with('+') { TOA_INTERNATIONAL } else { TOA_UNKNOWN };
                let cnum = format!("+CNUM: ,\"{}\",{},,4", number, toa);
                self.transport(TransportAction::AtString(addr, cnum));
                self.at_response(addr, true);
            }
            None => self.at_response(addr, false),
        }
    }

    pub(super) fn on_operator_name(&mut self, addr: RawAddress, name: Option<String>) {
        let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| "No operator".to_string());
        self.transport(TransportAction::Cops(addr, name));
    }

    pub(super) fn on_unknown_at(&mut self, addr: RawAddress, raw: &str) {
        let command = normalize_at(raw);
        debug!("[{}]: unknown command {}", addr, command);
        if command.starts_with("+CSQ") {
            self.at_response(addr, false);
            return;
        }
        let handled = self.vendor_specific_at(addr, &command);
        self.at_response(addr, handled);
    }

    fn vendor_specific_at(&mut self, addr: RawAddress, command: &str) -> bool {
        let Some((name, args)) = command.split_once('=') else {
            debug!("[{}]: {} isn't a set command", addr, command);
            return false;
        };
        let Some(company_id) = vendor_company_id(name) else {
            return false;
        };
        if args.starts_with('?') {
            return false;
        }
        self.push(Action::Notify(Notification::VendorEvent {
            addr,
            company_id,
            command: name.to_string(),
            args: args.to_string(),
        }));
        if name == "+XAPL" {
            self.transport(TransportAction::AtString(addr, "+XAPL=iPhone,2".to_string()));
        }
        true
    }

    pub(super) fn send_vendor_result_code(&mut self, addr: RawAddress, command: &str, arg: &str) {
        if !self.connected.contains(&addr) {
            warn!("[{}]: can't send {}, not connected", addr, command);
            return;
        }
        self.transport(TransportAction::AtString(addr, format!("{}: {}", command, arg)));
    }

    pub(super) fn on_device_state_changed(&mut self, status: DeviceStatus) {
        self.phone.device = status;
        if self.state != HfpState::Disconnected {
            self.transport(TransportAction::DeviceStatus(status));
        }
    }

    pub(super) fn on_media_playback_changed(&mut self, addr: RawAddress, playing: bool) {
        let was_playing = self.media.set_playing(addr, playing);
        if was_playing && !playing {
            if !self.media.is_suspended() {
                return;
            }
            if self.media.pending_ciev() {
                let cached = self.media.take_cached();
                if self.virtual_call {
                    self.start_virtual_sequence();
                } else {
                    for state in cached {
                        self.transport(TransportAction::PhoneState(state));
                    }
                }
            } else if let Some(target) = self.vr.pending_sco.take() {
                self.transport(TransportAction::ConnectAudio(target));
            }
        } else if !was_playing && playing {
            let in_call = self.phone.is_in_call() || self.virtual_call;
            if in_call && !self.connected.is_empty() && !self.media.is_suspended() {
                debug!("[{}]: music started during a call, suspending", addr);
                self.media.set_suspended(true);
                self.audio(AudioAction::SuspendMedia(true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(normalize_at("+xapl = 0a5c-0001,10"), "+XAPL=0A5C-0001,10");
        assert_eq!(normalize_at("+android=\"keep Case\""), "+ANDROID=\"keep Case\"");
    }

    #[test]
    fn vendors() {
        assert_eq!(vendor_company_id("+XEVENT"), Some(85));
        assert_eq!(vendor_company_id("+IPHONEACCEV"), Some(76));
        assert_eq!(vendor_company_id("+ANDROID"), Some(224));
        assert_eq!(vendor_company_id("+CSQ"), None);
    }
}
