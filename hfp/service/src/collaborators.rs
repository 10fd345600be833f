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

//! Collaborators of the daemon: a transport and an audio system that only log what they are
//! asked to do, and a scriptable phone standing in for telephony.

use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::Sender;

use hfp_ag::audio::IAudioSystem;
use hfp_ag::callbacks::{AudioState, IHfpCallback, ProfileConnectionState};
use hfp_ag::registry::Codec;
use hfp_ag::status::BtStatus;
use hfp_ag::telephony::{
    CallDirection, CallMode, CallPhase, CallState, ClccEntry, ClccStatus, DeviceStatus,
    ITelephony,
};
use hfp_ag::transport::{AtResponse, CindResponse, IHfpTransport, VolumeType};
use hfp_ag::{Event, Message, RawAddress};

const TOA_UNKNOWN: u32 = 129;

pub struct LoggingTransport;

impl IHfpTransport for LoggingTransport {
    fn connect(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> connect", addr);
        Ok(())
    }

    fn disconnect(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> disconnect", addr);
        Ok(())
    }

    fn connect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> connect audio", addr);
        Ok(())
    }

    fn disconnect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> disconnect audio", addr);
        Ok(())
    }

    fn configure_codec(&mut self, addr: RawAddress, codec: Codec) -> Result<(), BtStatus> {
        info!("[{}]: -> codec {:?}", addr, codec);
        Ok(())
    }

    fn start_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> +BVRA: 1", addr);
        Ok(())
    }

    fn stop_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
        info!("[{}]: -> +BVRA: 0", addr);
        Ok(())
    }

    fn set_volume(
        &mut self,
        addr: RawAddress,
        kind: VolumeType,
        volume: u8,
    ) -> Result<(), BtStatus> {
        let command = match kind {
            VolumeType::Speaker => "+VGS",
            VolumeType::Microphone => "+VGM",
        };
        info!("[{}]: -> {}: {}", addr, command, volume);
        Ok(())
    }

    fn at_response_code(&mut self, addr: RawAddress, code: AtResponse) -> Result<(), BtStatus> {
        let code = match code {
            AtResponse::Ok => "OK",
            AtResponse::Error => "ERROR",
        };
        info!("[{}]: -> {}", addr, code);
        Ok(())
    }

    fn at_response_string(&mut self, addr: RawAddress, response: &str) -> Result<(), BtStatus> {
        info!("[{}]: -> {}", addr, response);
        Ok(())
    }

    fn cind_response(&mut self, addr: RawAddress, cind: CindResponse) -> Result<(), BtStatus> {
        info!(
            "[{}]: -> +CIND: {},{},{},{},{},{},{}",
            addr,
            u8::from(cind.service),
            cind.num_active,
            cind.call_setup,
            cind.num_held,
            cind.signal,
            u8::from(cind.roam),
            cind.battery
        );
        Ok(())
    }

    fn cops_response(&mut self, addr: RawAddress, operator: &str) -> Result<(), BtStatus> {
        info!("[{}]: -> +COPS: 0,0,\"{}\"", addr, operator);
        Ok(())
    }

    fn clcc_response(&mut self, addr: RawAddress, entry: &ClccEntry) -> Result<(), BtStatus> {
        if entry.is_terminator() {
            info!("[{}]: -> OK", addr);
        } else {
            info!(
                "[{}]: -> +CLCC: {},{:?},{:?},{:?},{},\"{}\",{}",
                addr,
                entry.index,
                entry.direction,
                entry.status,
                entry.mode,
                u8::from(entry.multiparty),
                entry.number,
                entry.number_type
            );
        }
        Ok(())
    }

    fn phone_state_change(&mut self, state: &CallState) -> Result<(), BtStatus> {
        info!(
            "-> indicators: active {} held {} setup {:?} {}",
            state.num_active, state.num_held, state.phase, state.number
        );
        Ok(())
    }

    fn notify_device_status(&mut self, status: DeviceStatus) -> Result<(), BtStatus> {
        info!("-> device status {:?}", status);
        Ok(())
    }
}

pub struct LoggingAudio;

impl IAudioSystem for LoggingAudio {
    fn set_sco_route(&mut self, on: bool) {
        info!("audio: sco route {}", on);
    }

    fn set_wideband(&mut self, enabled: bool) {
        info!("audio: wideband {}", enabled);
    }

    fn set_nrec(&mut self, enabled: bool) {
        info!("audio: noise reduction {}", enabled);
    }

    fn set_sco_volume(&mut self, volume: u8, show_ui: bool) {
        info!("audio: sco volume {} (ui {})", volume, show_ui);
    }

    fn suspend_media(&mut self, suspend: bool) {
        info!("audio: media suspended {}", suspend);
    }

    fn start_silence(&mut self) {
        info!("audio: silence playing");
    }

    fn stop_silence(&mut self) {
        info!("audio: silence stopped");
    }

    fn voip_session(&mut self, active: bool) {
        info!("audio: voip session {}", active);
    }
}

/// Prints observer notifications on stdout.
pub struct ConsoleObserver;

impl IHfpCallback for ConsoleObserver {
    fn on_connection_state_changed(
        &mut self,
        addr: RawAddress,
        prev: ProfileConnectionState,
        state: ProfileConnectionState,
    ) {
        println!("[{}] connection {:?} -> {:?}", addr, prev, state);
    }

    fn on_audio_state_changed(&mut self, addr: RawAddress, prev: AudioState, state: AudioState) {
        println!("[{}] audio {:?} -> {:?}", addr, prev, state);
    }

    fn on_vendor_event(&mut self, addr: RawAddress, company_id: u32, command: &str, args: &str) {
        println!("[{}] vendor event {} {}={}", addr, company_id, command, args);
    }
}

/// Call progress requested from the shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStep {
    Dialing,
    Alerting,
    Incoming,
    Active,
    Held,
    Idle,
}

#[derive(Debug)]
struct PhoneModel {
    call: CallState,
    last_dialed: Option<String>,
    operator: Option<String>,
    subscriber: Option<String>,
}

/// Simulated phone shared by the shell and the telephony collaborator. Every call change is
/// posted to the driver as a call state event.
#[derive(Clone)]
pub struct Phone {
    model: Arc<Mutex<PhoneModel>>,
    tx: Sender<Message>,
}

impl Phone {
    pub fn new(tx: Sender<Message>) -> Self {
        let model = PhoneModel {
            call: CallState::idle(),
            last_dialed: None,
            operator: None,
            subscriber: None,
        };
        Self { model: Arc::new(Mutex::new(model)), tx }
    }

    fn model(&self) -> MutexGuard<'_, PhoneModel> {
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn call(&self) -> CallState {
        self.model().call.clone()
    }

    pub fn set_operator(&self, operator: Option<String>) {
        self.model().operator = operator;
    }

    pub fn set_subscriber(&self, subscriber: Option<String>) {
        self.model().subscriber = subscriber;
    }

    /// Moves the call along and reports the new state.
    pub fn step(&self, step: CallStep, number: &str) {
        let current = self.call();
        let state = match step {
            CallStep::Dialing => {
                CallState::new(current.num_active, current.num_held, CallPhase::Dialing)
                    .with_number(number, TOA_UNKNOWN)
            }
            CallStep::Alerting => CallState { phase: CallPhase::Alerting, ..current },
            CallStep::Incoming => {
                CallState::new(current.num_active, current.num_held, CallPhase::Incoming)
                    .with_number(number, TOA_UNKNOWN)
            }
            CallStep::Active => CallState { num_active: 1, phase: CallPhase::Idle, ..current },
            CallStep::Held => {
                CallState::new(0, current.num_held + current.num_active, CallPhase::Idle)
            }
            CallStep::Idle => CallState::idle(),
        };
        self.report(state);
    }

    fn report(&self, state: CallState) {
        self.model().call = state.clone();
        let event = Event::CallStateChanged { state, is_virtual: false };
        if let Err(e) = self.tx.try_send(Message::Event(event)) {
            warn!("Couldn't report call state: {}", e);
        }
    }

    fn post(&self, event: Event) {
        if let Err(e) = self.tx.try_send(Message::Event(event)) {
            warn!("Couldn't post telephony event: {}", e);
        }
    }
}

/// Telephony backed by the simulated `Phone`.
pub struct ShellTelephony {
    phone: Phone,
}

impl ShellTelephony {
    pub fn new(phone: Phone) -> Self {
        Self { phone }
    }
}

impl ITelephony for ShellTelephony {
    fn answer_call(&mut self) -> bool {
        let call = self.phone.call();
        if call.phase != CallPhase::Incoming {
            return false;
        }
        self.phone.report(CallState { num_active: 1, phase: CallPhase::Idle, ..call });
        true
    }

    fn hangup_call(&mut self) -> bool {
        let call = self.phone.call();
        if call == CallState::idle() {
            return false;
        }
        self.phone.report(CallState::idle());
        true
    }

    fn dial(&mut self, number: &str) -> bool {
        self.phone.model().last_dialed = Some(number.to_string());
        self.phone.step(CallStep::Dialing, number);
        true
    }

    fn last_dialed_number(&self) -> Option<String> {
        self.phone.model().last_dialed.clone()
    }

    fn send_dtmf(&mut self, code: char) -> bool {
        info!("telephony: dtmf {}", code);
        self.phone.call().num_active > 0
    }

    fn process_chld(&mut self, chld: u32) -> bool {
        info!("telephony: chld {}", chld);
        let call = self.phone.call();
        if chld > 4 || call == CallState::idle() {
            return false;
        }
        true
    }

    fn subscriber_number(&self) -> Option<String> {
        self.phone.model().subscriber.clone()
    }

    fn network_operator(&self) -> Option<String> {
        self.phone.model().operator.clone()
    }

    fn list_current_calls(&mut self) -> bool {
        let call = self.phone.call();
        let mut statuses = vec![];
        statuses.extend((0..call.num_active).map(|_| ClccStatus::Active));
        statuses.extend((0..call.num_held).map(|_| ClccStatus::Held));
        match call.phase {
            CallPhase::Dialing => statuses.push(ClccStatus::Dialing),
            CallPhase::Alerting => statuses.push(ClccStatus::Alerting),
            CallPhase::Incoming if statuses.is_empty() => statuses.push(ClccStatus::Incoming),
            CallPhase::Incoming => statuses.push(ClccStatus::Waiting),
            CallPhase::Idle => {}
        }

        for (index, status) in (1..).zip(statuses) {
            let direction = match status {
                ClccStatus::Incoming | ClccStatus::Waiting => CallDirection::Incoming,
                _ => CallDirection::Outgoing,
            };
            self.phone.post(Event::ClccResponse(ClccEntry {
                index,
                direction,
                status,
                mode: CallMode::Voice,
                multiparty: false,
                number: call.number.clone(),
                number_type: TOA_UNKNOWN,
            }));
        }
        self.phone.post(Event::ClccResponse(ClccEntry::terminator()));
        true
    }

    fn query_phone_state(&mut self) -> bool {
        let call = self.phone.call();
        self.phone.report(call);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    fn reported(rx: &mut tokio::sync::mpsc::Receiver<Message>) -> Vec<Event> {
        let mut events = vec![];
        while let Ok(Message::Event(event)) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn dial_and_answer() {
        let (tx, mut rx) = channel(16);
        let phone = Phone::new(tx);
        let mut telephony = ShellTelephony::new(phone.clone());

        assert!(telephony.dial("5551234"));
        assert_eq!(telephony.last_dialed_number(), Some("5551234".to_string()));
        assert_eq!(phone.call().phase, CallPhase::Dialing);
        assert!(!telephony.answer_call());

        phone.step(CallStep::Idle, "");
        phone.step(CallStep::Incoming, "5550000");
        assert!(telephony.answer_call());
        assert_eq!(phone.call().num_active, 1);
        assert_eq!(reported(&mut rx).len(), 4);
    }

    #[test]
    fn current_calls() {
        let (tx, mut rx) = channel(16);
        let phone = Phone::new(tx);
        let mut telephony = ShellTelephony::new(phone.clone());
        phone.step(CallStep::Active, "");
        phone.step(CallStep::Incoming, "5550000");
        reported(&mut rx);

        assert!(telephony.list_current_calls());
        let statuses: Vec<ClccStatus> = reported(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                Event::ClccResponse(entry) if !entry.is_terminator() => Some(entry.status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![ClccStatus::Active, ClccStatus::Waiting]);
    }
}
