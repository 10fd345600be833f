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

//! Audio gateway configuration.

use std::time::Duration;

/// Peer address prefixes known to mishandle a waiting call being reported right after the
/// active call ends.
pub const DEFAULT_QUIRK_PREFIXES: [&str; 5] =
    ["00:15:83", "2a:eb:00", "30:53:00", "00:17:53", "40:ef:4c"];

/// Upper bound on simultaneously connected hands-free peers.
pub const MAX_HF_CONNECTIONS: usize = 2;

/// Delays and timeouts used by the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HfpTimeouts {
    /// Bounds the dwell time in Pending / MultiPending for an outgoing connection.
    pub connect: Duration,
    /// Back-off before the single automatic reconnect attempt.
    pub connect_retry: Duration,
    /// How long a cellular Alerting indicator is held back after Dialing.
    pub call_alerting: Duration,
    /// How long a cellular Active indicator is held back.
    pub call_active: Duration,
    pub virtual_call_alerting: Duration,
    pub virtual_call_active: Duration,
    /// Bounds waiting for telephony to confirm a dial request from a peer.
    pub dialing: Duration,
    /// Bounds waiting for local voice recognition to start after a peer asked for it.
    pub voice_recognition_start: Duration,
    /// Bounds waiting for the final entry of a current-calls listing.
    pub current_calls_response: Duration,
    pub query_phone_state: Duration,
    pub incoming_call_indication: Duration,
}

impl Default for HfpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(30000),
            connect_retry: Duration::from_millis(2500),
            call_alerting: Duration::from_millis(800),
            call_active: Duration::from_millis(10),
            virtual_call_alerting: Duration::from_millis(800),
            virtual_call_active: Duration::from_millis(850),
            dialing: Duration::from_millis(10000),
            voice_recognition_start: Duration::from_millis(5000),
            current_calls_response: Duration::from_millis(5000),
            query_phone_state: Duration::from_millis(100),
            incoming_call_indication: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HfpConfig {
    /// Maximum connected peers, either 1 or 2.
    pub max_connections: usize,
    /// Whether the gateway plays the ring tone over the audio link.
    pub inband_ringing: bool,
    /// Play silence while voice recognition holds the audio link.
    pub playback_for_vr: bool,
    /// Play silence while a virtual call holds the audio link.
    pub playback_for_voip: bool,
    pub quirk_prefixes: Vec<String>,
    pub timeouts: HfpTimeouts,
}

impl Default for HfpConfig {
    fn default() -> Self {
        Self {
            max_connections: 1,
            inband_ringing: false,
            playback_for_vr: false,
            playback_for_voip: false,
            quirk_prefixes: DEFAULT_QUIRK_PREFIXES.iter().map(|p| p.to_string()).collect(),
            timeouts: HfpTimeouts::default(),
        }
    }
}

impl HfpConfig {
    /// Sets the peer capacity, clamped to the supported 1..=2 range.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.clamp(1, MAX_HF_CONNECTIONS);
        self
    }

    pub fn multi_hf(&self) -> bool {
        self.max_connections >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_connections_clamped() {
        assert_eq!(HfpConfig::default().with_max_connections(0).max_connections, 1);
        assert_eq!(HfpConfig::default().with_max_connections(2).max_connections, 2);
        assert_eq!(HfpConfig::default().with_max_connections(7).max_connections, 2);
        assert!(!HfpConfig::default().multi_hf());
    }

    #[test]
    fn default_timeouts() {
        let t = HfpTimeouts::default();
        assert_eq!(t.connect, Duration::from_secs(30));
        assert_eq!(t.connect_retry, Duration::from_millis(2500));
        assert!(t.call_active < t.call_alerting);
    }
}
