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

//! The shared audio link: open and close requests, audio events, per-peer audio parameters,
//! volume and voice recognition.

use log::{debug, info, warn};

use super::{HeadsetStateMachine, HfpState};
use crate::actions::{AudioAction, TransportAction};
use crate::address::RawAddress;
use crate::callbacks::AudioState;
use crate::events::Event;
use crate::registry::Codec;
use crate::timers::TimerId;
use crate::transport::{HfAudioState, VolumeType};

impl HeadsetStateMachine {
    fn sco_acceptable(&self) -> bool {
        self.sco.is_sco_acceptable(
            &self.phone,
            self.vr.is_active(),
            self.virtual_call,
            self.config.inband_ringing,
        )
    }

    pub(super) fn on_connect_audio_request(&mut self) {
        match self.state {
            HfpState::Disconnected => debug!("No peer to open audio to"),
            HfpState::Pending => self.defer(Event::ConnectAudio),
            HfpState::AudioOn => debug!("Audio already on"),
            HfpState::Connected | HfpState::MultiPending => {
                if !self.sco_acceptable() {
                    warn!("Audio isn't acceptable right now, not opening");
                    return;
                }
                if self.media.pending_ciev() {
                    warn!("Call indicators are held back, not opening audio yet");
                    return;
                }
                match self.sco.select_target(self.roles.current) {
                    Some(addr) if self.connected.contains(&addr) => {
                        self.transport(TransportAction::ConnectAudio(addr))
                    }
                    Some(addr) => warn!("[{}]: audio target isn't connected", addr),
                    None => warn!("No audio target"),
                }
            }
        }
    }

    pub(super) fn on_disconnect_audio_request(&mut self) {
        let Some(addr) = self.roles.active_audio else {
            debug!("No audio to close");
            return;
        };
        match self.state {
            HfpState::AudioOn => self.transport(TransportAction::DisconnectAudio(addr)),
            HfpState::MultiPending => {
                self.transport(TransportAction::DisconnectAudio(addr));
                self.sco.set_last_disconnect_requested(addr);
            }
            _ => debug!("[{}]: audio close ignored in {:?}", addr, self.state),
        }
    }

    pub(super) fn on_audio_state(&mut self, addr: RawAddress, state: HfAudioState) {
        if !self.connected.contains(&addr) {
            warn!("[{}]: audio {:?} from a peer that isn't connected", addr, state);
            return;
        }
        match state {
            HfAudioState::Connected => self.on_audio_connected(addr),
            HfAudioState::Connecting => {
                self.sco.audio_state = HfAudioState::Connecting;
                self.roles.active_audio = Some(addr);
                self.notify_audio(addr, AudioState::Disconnected, AudioState::Connecting);
            }
            HfAudioState::Disconnecting => {
                if self.roles.active_audio == Some(addr) {
                    self.sco.audio_state = HfAudioState::Disconnecting;
                }
            }
            HfAudioState::Disconnected => {
                if self.roles.active_audio == Some(addr) && self.sco.is_connected() {
                    self.audio_link_lost(addr);
                    if self.state == HfpState::AudioOn {
                        self.set_state(HfpState::Connected);
                    }
                } else {
                    if self.roles.active_audio == Some(addr) {
                        self.roles.active_audio = None;
                        self.sco.audio_state = HfAudioState::Disconnected;
                        self.notify_audio(addr, AudioState::Connecting, AudioState::Disconnected);
                    }
                    self.terminate_virtual_call();
                    self.release_media_if_idle();
                }
            }
        }
    }

    fn on_audio_connected(&mut self, addr: RawAddress) {
        if !self.sco_acceptable() {
            warn!("[{}]: audio isn't acceptable, closing it", addr);
            self.transport(TransportAction::DisconnectAudio(addr));
            return;
        }
        let prev = if self.roles.active_audio == Some(addr)
            && self.sco.audio_state == HfAudioState::Connecting
        {
            AudioState::Connecting
        } else {
            AudioState::Disconnected
        };
        info!("[{}]: audio connected", addr);
        self.sco.audio_state = HfAudioState::Connected;
        self.roles.active_audio = Some(addr);
        self.apply_audio_params(addr);

        let silence = (self.vr.started && self.config.playback_for_vr)
            || (self.virtual_call && self.config.playback_for_voip);
        if silence && !self.sco.silence_playing {
            self.sco.silence_playing = true;
            self.audio(AudioAction::StartSilence);
        }
        self.audio(AudioAction::ScoRoute(true));
        self.notify_audio(addr, prev, AudioState::Connected);
        if !self.phone.is_cs_call {
            self.audio(AudioAction::VoipSession(true));
        }
        self.sco.clear_remembered();

        if self.state == HfpState::Connected {
            self.set_state(HfpState::AudioOn);
        }
    }

    /// Bookkeeping once the audio link of `addr` is gone. The caller picks the next state.
    pub(super) fn audio_link_lost(&mut self, addr: RawAddress) {
        info!("[{}]: audio disconnected", addr);
        let prev = match self.sco.audio_state {
            HfAudioState::Connecting => AudioState::Connecting,
            _ => AudioState::Connected,
        };
        self.roles.active_audio = None;
        self.sco.audio_state = HfAudioState::Disconnected;
        self.audio(AudioAction::ScoRoute(false));
        self.terminate_virtual_call();
        self.release_media_if_idle();
        if !self.phone.is_cs_call {
            self.audio(AudioAction::VoipSession(false));
            self.phone.is_cs_call = true;
        }
        if self.sco.silence_playing {
            self.sco.silence_playing = false;
            self.audio(AudioAction::StopSilence);
        }
        self.notify_audio(addr, prev, AudioState::Disconnected);
    }

    fn release_media_if_idle(&mut self) {
        let idle = !self.phone.is_in_call()
            && self.phone.call.number.is_empty()
            && self.sync.is_empty();
        if self.media.is_suspended() && idle {
            debug!("Releasing media suspension");
            self.media.set_suspended(false);
            self.audio(AudioAction::SuspendMedia(false));
        }
    }

    fn apply_audio_params(&mut self, addr: RawAddress) {
        let params = self.registry.audio_params(&addr);
        self.audio(AudioAction::Wideband(params.codec == Codec::Wideband));
        self.audio(AudioAction::Nrec(params.nrec));
    }

    pub(super) fn on_codec_negotiated(&mut self, addr: RawAddress, codec: Codec) {
        if !self.registry.set_codec(&addr, codec) {
            warn!("[{}]: codec {:?} for an unknown peer", addr, codec);
            return;
        }
        debug!("[{}]: codec {:?}", addr, codec);
        self.audio(AudioAction::Wideband(codec == Codec::Wideband));
    }

    pub(super) fn on_noise_reduction(&mut self, addr: RawAddress, enabled: bool) {
        self.registry.set_nrec(&addr, enabled);
        if self.roles.active_audio == Some(addr) {
            self.apply_audio_params(addr);
        }
    }

    pub(super) fn on_set_codec(&mut self, addr: RawAddress, wideband: bool) {
        if !self.connected.contains(&addr) {
            warn!("[{}]: can't configure codec, not connected", addr);
            return;
        }
        let codec = if wideband { Codec::Wideband } else { Codec::Narrowband };
        self.transport(TransportAction::ConfigureCodec(addr, codec));
    }

    pub(super) fn on_remote_volume(&mut self, addr: RawAddress, kind: VolumeType, volume: u8) {
        if self.phone.is_in_call() && self.roles.active_audio != Some(addr) {
            debug!("[{}]: ignoring volume from a peer without audio during a call", addr);
            return;
        }
        match kind {
            VolumeType::Speaker => {
                self.phone.speaker_volume = volume;
                let show_ui = self.state == HfpState::AudioOn;
                self.audio(AudioAction::ScoVolume { volume, show_ui });
            }
            VolumeType::Microphone => self.phone.mic_volume = volume,
        }
    }

    pub(super) fn on_local_volume(&mut self, volume: u8) {
        if self.phone.speaker_volume == volume {
            return;
        }
        self.phone.speaker_volume = volume;
        if let Some(addr) = self.roles.active_audio {
            self.transport(TransportAction::SetVolume(addr, VolumeType::Speaker, volume));
        }
    }

    pub(super) fn on_audio_server_restarted(&mut self) {
        let Some(addr) = self.roles.active_audio else {
            return;
        };
        if !self.sco.is_connected() {
            return;
        }
        info!("[{}]: audio server restarted, restoring audio", addr);
        self.apply_audio_params(addr);
        self.audio(AudioAction::ScoRoute(true));
        self.notify_audio(addr, AudioState::Disconnected, AudioState::Connected);
    }

    pub(super) fn on_call_type_changed(&mut self, cellular: bool) {
        self.phone.is_cs_call = cellular;
        if self.roles.active_audio.is_some() && !cellular {
            self.audio(AudioAction::VoipSession(true));
        }
    }

    /// The peer started or stopped voice recognition.
    pub(super) fn on_remote_voice_recognition(&mut self, addr: RawAddress, started: bool) {
        if started {
            if self.virtual_call || self.phone.is_in_call() {
                info!("[{}]: voice recognition refused during a call", addr);
                self.at_response(addr, false);
                return;
            }
            self.vr.waiting = Some(addr);
            self.start_timer(TimerId::VoiceRecognitionStart(addr));
            return;
        }

        if !self.vr.is_active() {
            self.at_response(addr, false);
            return;
        }
        self.at_response(addr, true);
        if let Some(waiting) = self.vr.waiting.take() {
            self.cancel_timer(TimerId::VoiceRecognitionStart(waiting));
        }
        self.vr.started = false;
        if !self.phone.is_in_call() {
            if let Some(audio) = self.roles.active_audio {
                self.transport(TransportAction::DisconnectAudio(audio));
            }
            if self.media.is_suspended() {
                self.media.set_suspended(false);
                self.audio(AudioAction::SuspendMedia(false));
            }
        }
    }

    pub(super) fn on_voice_recognition_timeout(&mut self, addr: RawAddress) {
        if self.vr.waiting == Some(addr) {
            warn!("[{}]: voice recognition didn't start in time", addr);
            self.vr.waiting = None;
            self.at_response(addr, false);
        }
    }

    pub(super) fn on_start_voice_recognition(&mut self) {
        if !self.is_connected_state() {
            debug!("No peer for voice recognition");
            return;
        }
        if self.vr.started || self.phone.is_in_call() {
            warn!("Voice recognition can't start now");
            return;
        }
        let target = if let Some(waiting) = self.vr.waiting.take() {
            self.cancel_timer(TimerId::VoiceRecognitionStart(waiting));
            self.at_response(waiting, true);
            waiting
        } else {
            let Some(current) = self.roles.current else {
                return;
            };
            self.transport(TransportAction::StartVoiceRecognition(current));
            current
        };
        self.vr.started = true;

        if self.is_audio_on() {
            return;
        }
        if self.media.is_connected() && !self.media.is_suspended() {
            self.media.set_suspended(true);
            self.audio(AudioAction::SuspendMedia(true));
        }
        if self.media.is_playing() {
            debug!("[{}]: audio waits for the music stream to stop", target);
            self.vr.pending_sco = Some(target);
        } else {
            self.transport(TransportAction::ConnectAudio(target));
        }
    }

    pub(super) fn on_stop_voice_recognition(&mut self) {
        if !self.vr.started {
            debug!("Voice recognition isn't running");
            return;
        }
        self.vr.started = false;
        self.vr.pending_sco = None;
        if let Some(current) = self.roles.current {
            self.transport(TransportAction::StopVoiceRecognition(current));
        }
        if let Some(audio) = self.roles.active_audio {
            if !self.phone.is_in_call() || self.phone.is_ringing() {
                self.transport(TransportAction::DisconnectAudio(audio));
                if self.media.is_suspended() {
                    self.media.set_suspended(false);
                    self.audio(AudioAction::SuspendMedia(false));
                }
            }
        }
    }
}
