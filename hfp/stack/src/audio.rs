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

//! Platform audio collaborator: routing, mixer parameters and the media-stream controls used
//! while calls hold the audio link.

/// Platform audio manager as seen by the gateway.
pub trait IAudioSystem {
    /// Switches the voice path to or from the hands-free audio link.
    fn set_sco_route(&mut self, on: bool);
    fn set_wideband(&mut self, enabled: bool);
    fn set_nrec(&mut self, enabled: bool);
    fn set_sco_volume(&mut self, volume: u8, show_ui: bool);
    /// Holds or releases the concurrent music stream.
    fn suspend_media(&mut self, suspend: bool);
    fn start_silence(&mut self);
    fn stop_silence(&mut self);
    /// Tells the connectivity layer that a non-cellular voice session started or ended.
    fn voip_session(&mut self, active: bool);
}
