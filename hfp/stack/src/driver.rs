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

//! Event loop around the headset state machine.
//!
//! `HfpDriver` owns the machine and its collaborators. It feeds one message at a time into the
//! machine, runs the returned actions in order and loops results and deferred events back in
//! before the next message is taken from the channel.

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::actions::{
    Action, AudioAction, DialTarget, Notification, TelephonyAction, TransportAction,
};
use crate::audio::IAudioSystem;
use crate::callbacks::{Callbacks, IHfpCallback};
use crate::events::{Event, Outcome};
use crate::state_machine::HeadsetStateMachine;
use crate::telephony::ITelephony;
use crate::timers::Timers;
use crate::transport::IHfpTransport;
use crate::Message;

/// Capacity of the driver's message channel.
pub const MESSAGE_QUEUE_DEPTH: usize = 256;

pub struct HfpDriver {
    machine: HeadsetStateMachine,
    transport: Box<dyn IHfpTransport + Send>,
    audio: Box<dyn IAudioSystem + Send>,
    telephony: Box<dyn ITelephony + Send>,
    callbacks: Callbacks<dyn IHfpCallback + Send>,
    timers: Timers,
}

impl HfpDriver {
    /// `tx` is the sending side of the channel later passed to `run`; timers post into it.
    pub fn new(
        machine: HeadsetStateMachine,
        transport: Box<dyn IHfpTransport + Send>,
        audio: Box<dyn IAudioSystem + Send>,
        telephony: Box<dyn ITelephony + Send>,
        tx: Sender<Message>,
    ) -> Self {
        Self {
            machine,
            transport,
            audio,
            telephony,
            callbacks: Callbacks::new(),
            timers: Timers::new(tx),
        }
    }

    pub fn machine(&self) -> &HeadsetStateMachine {
        &self.machine
    }

    pub fn register_callback(&mut self, callback: Box<dyn IHfpCallback + Send>) -> u32 {
        self.callbacks.add_callback(callback)
    }

    pub fn unregister_callback(&mut self, id: u32) -> bool {
        self.callbacks.remove_callback(id)
    }

    /// Processes messages until the channel closes or a shutdown is handled.
    pub async fn run(mut self, mut rx: Receiver<Message>) {
        info!("starting event loop");
        while let Some(message) = rx.recv().await {
            if !self.handle_message(message) {
                break;
            }
        }
        self.timers.cancel_all();
        info!("event loop stopped");
    }

    /// Handles one message. Returns false once the loop should stop.
    pub fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Event(event) => self.dispatch(event),
            Message::Timer(id, generation) => {
                if self.timers.claim(id, generation) {
                    self.dispatch(Event::Timeout(id));
                }
            }
            Message::Call(f) => f(self),
            Message::Shutdown => {
                self.dispatch(Event::Shutdown);
                self.timers.cancel_all();
                return false;
            }
        }
        true
    }

    /// Runs `event` to completion: its actions, the outcomes they produce and any deferred
    /// events released by a state change.
    pub fn dispatch(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let actions = self.machine.process(event);
            let outcomes = self.execute(actions);
            let replay = self.machine.take_replay();
            for event in replay.into_iter().rev() {
                pending.push_front(event);
            }
            for outcome in outcomes.into_iter().rev() {
                pending.push_front(Event::Outcome(outcome));
            }
        }
    }

    fn execute(&mut self, actions: Vec<Action>) -> Vec<Outcome> {
        let mut outcomes = vec![];
        for action in actions {
            match action {
                Action::Transport(action) => {
                    if let Err(outcome) = self.run_transport(action) {
                        debug!("Dropping the rest of the batch after {:?}", outcome);
                        outcomes.push(outcome);
                        break;
                    }
                }
                Action::Audio(action) => self.run_audio(action),
                Action::Telephony(action) => outcomes.extend(self.run_telephony(action)),
                Action::Notify(notification) => self.notify(notification),
                Action::StartTimer(id, delay) => self.timers.arm(id, delay),
                Action::CancelTimer(id) => {
                    self.timers.cancel(id);
                }
            }
        }
        outcomes
    }

    /// Link and audio requests that fail abort the batch with an outcome, other failures are
    /// only logged.
    fn run_transport(&mut self, action: TransportAction) -> Result<(), Outcome> {
        let t = &mut self.transport;
        let (result, failure) = match action {
            TransportAction::Connect(addr) => (t.connect(addr), Some(Outcome::ConnectFailed(addr))),
            TransportAction::Disconnect(addr) => {
                (t.disconnect(addr), Some(Outcome::DisconnectFailed(addr)))
            }
            TransportAction::ConnectAudio(addr) => {
                (t.connect_audio(addr), Some(Outcome::AudioConnectFailed(addr)))
            }
            TransportAction::DisconnectAudio(addr) => {
                (t.disconnect_audio(addr), Some(Outcome::AudioDisconnectFailed(addr)))
            }
            TransportAction::ConfigureCodec(addr, codec) => (t.configure_codec(addr, codec), None),
            TransportAction::StartVoiceRecognition(addr) => {
                (t.start_voice_recognition(addr), None)
            }
            TransportAction::StopVoiceRecognition(addr) => (t.stop_voice_recognition(addr), None),
            TransportAction::SetVolume(addr, kind, volume) => {
                (t.set_volume(addr, kind, volume), None)
            }
            TransportAction::AtResponse(addr, code) => (t.at_response_code(addr, code), None),
            TransportAction::AtString(addr, response) => {
                (t.at_response_string(addr, &response), None)
            }
            TransportAction::Cind(addr, cind) => (t.cind_response(addr, cind), None),
            TransportAction::Cops(addr, operator) => (t.cops_response(addr, &operator), None),
            TransportAction::Clcc(addr, entry) => (t.clcc_response(addr, &entry), None),
            TransportAction::PhoneState(state) => (t.phone_state_change(&state), None),
            TransportAction::DeviceStatus(status) => (t.notify_device_status(status), None),
        };

        match (result, failure) {
            (Ok(()), _) => Ok(()),
            (Err(status), Some(outcome)) => {
                error!("Transport request failed with {}: {:?}", status, outcome);
                Err(outcome)
            }
            (Err(status), None) => {
                warn!("Transport request failed with {}", status);
                Ok(())
            }
        }
    }

    fn run_audio(&mut self, action: AudioAction) {
        let a = &mut self.audio;
        match action {
            AudioAction::ScoRoute(on) => a.set_sco_route(on),
            AudioAction::Wideband(enabled) => a.set_wideband(enabled),
            AudioAction::Nrec(enabled) => a.set_nrec(enabled),
            AudioAction::ScoVolume { volume, show_ui } => a.set_sco_volume(volume, show_ui),
            AudioAction::SuspendMedia(suspend) => a.suspend_media(suspend),
            AudioAction::StartSilence => a.start_silence(),
            AudioAction::StopSilence => a.stop_silence(),
            AudioAction::VoipSession(active) => a.voip_session(active),
        }
    }

    fn run_telephony(&mut self, action: TelephonyAction) -> Option<Outcome> {
        let t = &mut self.telephony;
        match action {
            TelephonyAction::Answer => {
                if !t.answer_call() {
                    warn!("Telephony couldn't answer");
                }
                None
            }
            TelephonyAction::Hangup => {
                if !t.hangup_call() {
                    warn!("Telephony couldn't hang up");
                }
                None
            }
            TelephonyAction::Dial { addr, target } => {
                let number = match target {
                    DialTarget::Number(number) => Some(number),
                    DialTarget::LastDialed => t.last_dialed_number(),
                };
                match number {
                    Some(number) if t.dial(&number) => None,
                    Some(number) => {
                        warn!("[{}]: dialing {} failed", addr, number);
                        Some(Outcome::DialFailed(addr))
                    }
                    None => {
                        warn!("[{}]: no number to redial", addr);
                        Some(Outcome::DialFailed(addr))
                    }
                }
            }
            TelephonyAction::SendDtmf(code) => {
                if !t.send_dtmf(code) {
                    warn!("Telephony couldn't send DTMF {}", code);
                }
                None
            }
            TelephonyAction::Chld { addr, chld } => {
                Some(Outcome::ChldResult { addr, ok: t.process_chld(chld) })
            }
            TelephonyAction::SubscriberNumber(addr) => {
                Some(Outcome::SubscriberNumber { addr, number: t.subscriber_number() })
            }
            TelephonyAction::OperatorName(addr) => {
                Some(Outcome::OperatorName { addr, name: t.network_operator() })
            }
            TelephonyAction::ListCurrentCalls(addr) => {
                if t.list_current_calls() {
                    None
                } else {
                    Some(Outcome::CurrentCallsUnavailable(addr))
                }
            }
            TelephonyAction::QueryPhoneState => {
                if !t.query_phone_state() {
                    debug!("Telephony ignored the phone state query");
                }
                None
            }
        }
    }

    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::ConnectionState { addr, prev, state } => {
                self.callbacks.for_all_callbacks(|cb| {
                    cb.on_connection_state_changed(addr, prev, state);
                });
            }
            Notification::AudioState { addr, prev, state } => {
                self.callbacks.for_all_callbacks(|cb| {
                    cb.on_audio_state_changed(addr, prev, state);
                });
            }
            Notification::VendorEvent { addr, company_id, command, args } => {
                self.callbacks.for_all_callbacks(|cb| {
                    cb.on_vendor_event(addr, company_id, &command, &args);
                });
            }
        }
    }
}

/// Lifecycle of the driver's event loop, as seen from outside of it.
#[derive(Default, Debug)]
pub enum HfpRunner {
    /// Not started yet
    #[default]
    NotStarted,
    /// The event loop is running, use [`HfpRunner::send`] to queue messages.
    Running { tx: Sender<Message> },
    /// Shutdown was requested. The loop stops once it reaches the shutdown message.
    Stopping,
    /// The event loop has ended. `result` holds an error if it didn't end gracefully.
    Ended { result: Result<(), String> },
}

impl HfpRunner {
    pub fn new() -> Self {
        Self::NotStarted
    }

    /// Creates the message channel. The receiver goes to `HfpDriver::run`.
    pub fn start(&mut self) -> Result<(Sender<Message>, Receiver<Message>), String> {
        match self {
            Self::Running { .. } => return Err("Already started".to_string()),
            Self::Ended { result } => return Err(format!("Already finished: {:?}", result)),
            Self::Stopping => return Err("Can't start, finishing".to_string()),
            Self::NotStarted => {}
        }

        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);
        *self = Self::Running { tx: tx.clone() };
        Ok((tx, rx))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn send(&self, message: Message) -> Result<(), (String, Message)> {
        match self {
            Self::NotStarted => Err(("Not started yet".to_string(), message)),
            Self::Ended { .. } | Self::Stopping => Err(("Runner ended".to_string(), message)),
            Self::Running { tx } => tx.try_send(message).map_err(|e| match e {
                mpsc::error::TrySendError::Full(m) => ("Queue full".to_string(), m),
                mpsc::error::TrySendError::Closed(m) => ("Failed to send".to_string(), m),
            }),
        }
    }

    /// Asks the event loop to stop after the messages already queued.
    pub fn shutdown(&mut self) {
        match std::mem::replace(self, Self::Stopping) {
            Self::NotStarted => {
                warn!("Runner being stopped when it hasn't been started");
                if let Err(e) = self.finished(Err("Never started".to_string())) {
                    warn!("failed to record runner finish: {}", e);
                }
            }
            Self::Stopping => warn!("Asked to shutdown twice before stopped"),
            Self::Running { tx } => {
                if tx.try_send(Message::Shutdown).is_err() {
                    error!("Couldn't queue shutdown, the event loop is gone");
                }
            }
            ended @ Self::Ended { .. } => *self = ended,
        }
    }

    pub fn finished(&mut self, result: Result<(), String>) -> Result<(), String> {
        match self {
            Self::NotStarted => return Err("Not started".to_string()),
            Self::Ended { result } => return Err(format!("Already finished with {:?}", result)),
            Self::Running { .. } | Self::Stopping => {}
        }

        *self = Self::Ended { result };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::address::RawAddress;
    use crate::callbacks::{AudioState, ProfileConnectionState};
    use crate::config::HfpConfig;
    use crate::policy::{PrefixQuirks, PriorityStore};
    use crate::registry::Codec;
    use crate::state_machine::HfpState;
    use crate::status::BtStatus;
    use crate::telephony::{CallState, ClccEntry, DeviceStatus};
    use crate::timers::TimerId;
    use crate::transport::{
        AtResponse, CallControl, CindResponse, HfConnectionState, TransportEvent, VolumeType,
    };

    const A: RawAddress = RawAddress::new([0xd, 0, 0, 0, 0, 1]);

    type Log = Arc<Mutex<Vec<TransportAction>>>;

    #[derive(Default)]
    struct FakeTransport {
        log: Log,
        fail_connect: bool,
        fail_disconnect: bool,
    }

    impl FakeTransport {
        fn record(&self, action: TransportAction) -> Result<(), BtStatus> {
            self.log.lock().unwrap().push(action);
            Ok(())
        }
    }

    impl IHfpTransport for FakeTransport {
        fn connect(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            if self.fail_connect {
                return Err(BtStatus::Busy);
            }
            self.record(TransportAction::Connect(addr))
        }
        fn disconnect(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            if self.fail_disconnect {
                return Err(BtStatus::Fail);
            }
            self.record(TransportAction::Disconnect(addr))
        }
        fn connect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            self.record(TransportAction::ConnectAudio(addr))
        }
        fn disconnect_audio(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            self.record(TransportAction::DisconnectAudio(addr))
        }
        fn configure_codec(&mut self, addr: RawAddress, codec: Codec) -> Result<(), BtStatus> {
            self.record(TransportAction::ConfigureCodec(addr, codec))
        }
        fn start_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            self.record(TransportAction::StartVoiceRecognition(addr))
        }
        fn stop_voice_recognition(&mut self, addr: RawAddress) -> Result<(), BtStatus> {
            self.record(TransportAction::StopVoiceRecognition(addr))
        }
        fn set_volume(
            &mut self,
            addr: RawAddress,
            kind: VolumeType,
            volume: u8,
        ) -> Result<(), BtStatus> {
            self.record(TransportAction::SetVolume(addr, kind, volume))
        }
        fn at_response_code(&mut self, addr: RawAddress, code: AtResponse) -> Result<(), BtStatus> {
            self.record(TransportAction::AtResponse(addr, code))
        }
        fn at_response_string(&mut self, addr: RawAddress, response: &str) -> Result<(), BtStatus> {
            self.record(TransportAction::AtString(addr, response.to_string()))
        }
        fn cind_response(&mut self, addr: RawAddress, cind: CindResponse) -> Result<(), BtStatus> {
            self.record(TransportAction::Cind(addr, cind))
        }
        fn cops_response(&mut self, addr: RawAddress, operator: &str) -> Result<(), BtStatus> {
            self.record(TransportAction::Cops(addr, operator.to_string()))
        }
        fn clcc_response(&mut self, addr: RawAddress, entry: &ClccEntry) -> Result<(), BtStatus> {
            self.record(TransportAction::Clcc(addr, entry.clone()))
        }
        fn phone_state_change(&mut self, state: &CallState) -> Result<(), BtStatus> {
            self.record(TransportAction::PhoneState(state.clone()))
        }
        fn notify_device_status(&mut self, status: DeviceStatus) -> Result<(), BtStatus> {
            self.record(TransportAction::DeviceStatus(status))
        }
    }

    struct NullAudio;

    impl IAudioSystem for NullAudio {
        fn set_sco_route(&mut self, _on: bool) {}
        fn set_wideband(&mut self, _enabled: bool) {}
        fn set_nrec(&mut self, _enabled: bool) {}
        fn set_sco_volume(&mut self, _volume: u8, _show_ui: bool) {}
        fn suspend_media(&mut self, _suspend: bool) {}
        fn start_silence(&mut self) {}
        fn stop_silence(&mut self) {}
        fn voip_session(&mut self, _active: bool) {}
    }

    #[derive(Default)]
    struct FakeTelephony {
        last_dialed: Option<String>,
    }

    impl ITelephony for FakeTelephony {
        fn answer_call(&mut self) -> bool {
            true
        }
        fn hangup_call(&mut self) -> bool {
            true
        }
        fn dial(&mut self, _number: &str) -> bool {
            true
        }
        fn last_dialed_number(&self) -> Option<String> {
            self.last_dialed.clone()
        }
        fn send_dtmf(&mut self, _code: char) -> bool {
            true
        }
        fn process_chld(&mut self, chld: u32) -> bool {
            chld < 5
        }
        fn subscriber_number(&self) -> Option<String> {
            None
        }
        fn network_operator(&self) -> Option<String> {
            Some("Carrier".to_string())
        }
        fn list_current_calls(&mut self) -> bool {
            false
        }
        fn query_phone_state(&mut self) -> bool {
            true
        }
    }

    struct StateRecorder {
        seen: Arc<Mutex<Vec<ProfileConnectionState>>>,
    }

    impl IHfpCallback for StateRecorder {
        fn on_connection_state_changed(
            &mut self,
            _addr: RawAddress,
            _prev: ProfileConnectionState,
            state: ProfileConnectionState,
        ) {
            self.seen.lock().unwrap().push(state);
        }
        fn on_audio_state_changed(&mut self, _: RawAddress, _: AudioState, _: AudioState) {}
        fn on_vendor_event(&mut self, _: RawAddress, _: u32, _: &str, _: &str) {}
    }

    fn make_driver(
        transport: FakeTransport,
        tx: Sender<Message>,
    ) -> (HfpDriver, Arc<Mutex<Vec<ProfileConnectionState>>>) {
        let config = HfpConfig::default();
        let quirks = PrefixQuirks::new(&config.quirk_prefixes);
        let machine =
            HeadsetStateMachine::new(config, Box::new(PriorityStore::new()), Box::new(quirks));
        let mut driver = HfpDriver::new(
            machine,
            Box::new(transport),
            Box::new(NullAudio),
            Box::new(FakeTelephony::default()),
            tx,
        );
        let seen = Arc::new(Mutex::new(vec![]));
        driver.register_callback(Box::new(StateRecorder { seen: seen.clone() }));
        (driver, seen)
    }

    fn slc_up(driver: &mut HfpDriver, addr: RawAddress) {
        driver.dispatch(Event::Transport(TransportEvent::ConnectionStateChanged {
            addr,
            state: HfConnectionState::SlcConnected,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_rolls_back() {
        let (tx, _rx) = mpsc::channel(8);
        let transport = FakeTransport { fail_connect: true, ..Default::default() };
        let (mut driver, seen) = make_driver(transport, tx);

        driver.dispatch(Event::Connect(A));
        assert_eq!(driver.machine().state(), HfpState::Disconnected);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProfileConnectionState::Connecting, ProfileConnectionState::Disconnected]
        );
        assert!(!driver.timers.is_armed(&TimerId::Connect(A)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_close_of_cancelled_connect() {
        let (tx, _rx) = mpsc::channel(8);
        let transport = FakeTransport { fail_disconnect: true, ..Default::default() };
        let (mut driver, seen) = make_driver(transport, tx);

        driver.dispatch(Event::Connect(A));
        driver.dispatch(Event::Disconnect(A));
        assert_eq!(driver.machine().state(), HfpState::Disconnected);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProfileConnectionState::Connecting, ProfileConnectionState::Disconnected]
        );
        assert!(!driver.timers.is_armed(&TimerId::Connect(A)));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_retries_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let transport = FakeTransport::default();
        let log = transport.log.clone();
        let (mut driver, _) = make_driver(transport, tx);

        driver.dispatch(Event::Connect(A));
        assert!(driver.timers.is_armed(&TimerId::Connect(A)));

        // Connect timeout, then the retry back-off.
        for _ in 0..2 {
            let Some(message) = rx.recv().await else {
                panic!("channel closed");
            };
            assert!(driver.handle_message(message));
        }
        let connects =
            log.lock().unwrap().iter().filter(|a| **a == TransportAction::Connect(A)).count();
        assert_eq!(connects, 2);
        assert_eq!(driver.machine().state(), HfpState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn telephony_results_reach_peer() {
        let (tx, _rx) = mpsc::channel(8);
        let transport = FakeTransport::default();
        let log = transport.log.clone();
        let (mut driver, _) = make_driver(transport, tx);
        driver.dispatch(Event::Connect(A));
        slc_up(&mut driver, A);
        log.lock().unwrap().clear();

        // Nothing to redial.
        let redial = CallControl::Dial(String::new());
        driver.dispatch(Event::Transport(TransportEvent::CallControl { addr: A, request: redial }));
        assert_eq!(*log.lock().unwrap(), vec![TransportAction::AtResponse(A, AtResponse::Error)]);
        log.lock().unwrap().clear();

        let chld = CallControl::Chld(1);
        driver.dispatch(Event::Transport(TransportEvent::CallControl { addr: A, request: chld }));
        assert_eq!(*log.lock().unwrap(), vec![TransportAction::AtResponse(A, AtResponse::Ok)]);
        log.lock().unwrap().clear();

        let query = crate::transport::IndicatorQuery::CurrentCalls;
        driver.dispatch(Event::Transport(TransportEvent::IndicatorQuery { addr: A, query }));
        assert_eq!(*log.lock().unwrap(), vec![TransportAction::Clcc(A, ClccEntry::terminator())]);
        assert!(!driver.timers.is_armed(&TimerId::CurrentCalls(A)));
    }

    #[tokio::test(start_paused = true)]
    async fn runner_lifecycle() {
        let mut runner = HfpRunner::new();
        assert!(runner.send(Message::Shutdown).is_err());

        let (tx, rx) = runner.start().unwrap();
        assert!(runner.start().is_err());
        let transport = FakeTransport::default();
        let log = transport.log.clone();
        let (driver, seen) = make_driver(transport, tx);
        let handle = tokio::spawn(driver.run(rx));

        assert!(runner.send(Message::Event(Event::Connect(A))).is_ok());
        runner.shutdown();
        assert!(!runner.is_running());
        handle.await.unwrap();
        runner.finished(Ok(())).unwrap();
        assert!(matches!(runner, HfpRunner::Ended { result: Ok(()) }));

        assert_eq!(*log.lock().unwrap(), vec![TransportAction::Connect(A)]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProfileConnectionState::Connecting, ProfileConnectionState::Disconnected]
        );
    }
}
