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

//! Ordering of call indicators sent to peers.
//!
//! Telephony reports the alerting and active phases of an outgoing call in quick succession,
//! sometimes ahead of the network. `CallSynchronizer` holds those two updates back for a short
//! while so peers always see dialing, alerting and active in order, and never see an update
//! overtaken by a stale one. `MediaSync` tracks the concurrent music stream, which has to be
//! suspended before a peer learns about a call.

use log::{debug, warn};
use std::collections::{HashSet, VecDeque};

use crate::address::RawAddress;
use crate::telephony::{CallPhase, CallState};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing is held back.
    #[default]
    Idle,
    /// An alerting update waits for its timer, optionally followed by an active update.
    AlertingQueued { alerting: CallState, active: Option<CallState> },
    /// An active update waits for its timer.
    ActiveQueued { active: CallState },
}

/// What the owner of the synchronizer has to do, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncStep {
    Forward(CallState),
    ArmAlerting,
    ArmActive,
    CancelAlerting,
    CancelActive,
}

#[derive(Debug, Default)]
pub struct CallSynchronizer {
    state: SyncState,
}

impl CallSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == SyncState::Idle
    }

    /// Whether an alerting update is at the head of the queue.
    pub fn alerting_queued(&self) -> bool {
        matches!(self.state, SyncState::AlertingQueued { .. })
    }

    /// Handles a cellular call update. `tracked` is the call state last forwarded to peers.
    pub fn on_call_state_changed(&mut self, tracked: &CallState, new: CallState) -> Vec<SyncStep> {
        let in_setup = matches!(tracked.phase, CallPhase::Dialing | CallPhase::Alerting);

        if new.phase == CallPhase::Dialing {
            let mut steps = self.flush();
            steps.push(SyncStep::Forward(new));
            return steps;
        }

        if new.phase == CallPhase::Alerting
            && tracked.same_counts(&new)
            && tracked.phase == CallPhase::Dialing
        {
            match self.state {
                SyncState::Idle => {
                    debug!("Queue alerting update");
                    self.state = SyncState::AlertingQueued { alerting: new, active: None };
                    return vec![SyncStep::ArmAlerting];
                }
                SyncState::AlertingQueued { .. } => {
                    warn!("Alerting update already queued, dropping {:?}", new);
                    return vec![];
                }
                SyncState::ActiveQueued { .. } => {}
            }
        } else if tracked.num_active == 0
            && new.num_active == 1
            && tracked.num_held == new.num_held
            && in_setup
        {
            match &mut self.state {
                SyncState::Idle => {
                    debug!("Call is active, queue it");
                    self.state = SyncState::ActiveQueued { active: new };
                    return vec![SyncStep::ArmActive];
                }
                SyncState::AlertingQueued { active, .. } => {
                    debug!("Call is active, queue it behind alerting");
                    *active = Some(new);
                    return vec![];
                }
                SyncState::ActiveQueued { active } => {
                    *active = new;
                    return vec![];
                }
            }
        } else if in_setup && new.phase == CallPhase::Idle && tracked.same_counts(&new) {
            debug!("Call setup ended before answer");
            let mut steps = vec![];
            match std::mem::take(&mut self.state) {
                SyncState::Idle => {}
                SyncState::AlertingQueued { alerting, .. } => {
                    steps.push(SyncStep::CancelAlerting);
                    steps.push(SyncStep::Forward(alerting));
                }
                SyncState::ActiveQueued { .. } => steps.push(SyncStep::CancelActive),
            }
            steps.push(SyncStep::Forward(new));
            return steps;
        }

        let mut steps = self.flush();
        steps.push(SyncStep::Forward(new));
        steps
    }

    pub fn on_alerting_timeout(&mut self) -> Vec<SyncStep> {
        match std::mem::take(&mut self.state) {
            SyncState::AlertingQueued { alerting, active } => {
                let mut steps = vec![SyncStep::Forward(alerting)];
                if let Some(active) = active {
                    self.state = SyncState::ActiveQueued { active };
                    steps.push(SyncStep::ArmActive);
                }
                steps
            }
            other => {
                self.state = other;
                vec![]
            }
        }
    }

    pub fn on_active_timeout(&mut self) -> Vec<SyncStep> {
        match std::mem::take(&mut self.state) {
            SyncState::ActiveQueued { active } => vec![SyncStep::Forward(active)],
            other => {
                self.state = other;
                vec![]
            }
        }
    }

    /// Releases everything held back, oldest first.
    pub fn flush(&mut self) -> Vec<SyncStep> {
        match std::mem::take(&mut self.state) {
            SyncState::Idle => vec![],
            SyncState::AlertingQueued { alerting, active } => {
                let mut steps = vec![SyncStep::CancelAlerting, SyncStep::Forward(alerting)];
                steps.extend(active.map(SyncStep::Forward));
                steps
            }
            SyncState::ActiveQueued { active } => {
                vec![SyncStep::CancelActive, SyncStep::Forward(active)]
            }
        }
    }
}

/// Music stream state and the call indicators held back while it stops.
#[derive(Debug, Default)]
pub struct MediaSync {
    connected: HashSet<RawAddress>,
    playing: HashSet<RawAddress>,
    suspended: bool,
    cached: VecDeque<CallState>,
    pending_ciev: bool,
}

impl MediaSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&mut self, addr: RawAddress, connected: bool) {
        if connected {
            self.connected.insert(addr);
        } else {
            self.connected.remove(&addr);
            self.playing.remove(&addr);
        }
    }

    /// Records the playback state of `addr`. Returns the previous state.
    pub fn set_playing(&mut self, addr: RawAddress, playing: bool) -> bool {
        if !self.connected.contains(&addr) {
            debug!("[{}]: playback reported before connection, adding", addr);
            self.connected.insert(addr);
        }
        if playing {
            !self.playing.insert(addr)
        } else {
            self.playing.remove(&addr)
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        !self.playing.is_empty()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub fn pending_ciev(&self) -> bool {
        self.pending_ciev
    }

    /// Marks call indicators as held back until the stream stops.
    pub fn set_pending_ciev(&mut self) {
        self.pending_ciev = true;
    }

    pub fn cache(&mut self, state: CallState) {
        self.pending_ciev = true;
        self.cached.push_back(state);
    }

    /// Drains the held back indicators and clears the pending flag.
    pub fn take_cached(&mut self) -> Vec<CallState> {
        self.pending_ciev = false;
        self.cached.drain(..).collect()
    }

    /// Forgets per-call bookkeeping when a new peer link comes up.
    pub fn reset_call_tracking(&mut self) {
        self.suspended = false;
        self.pending_ciev = false;
        self.cached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialing() -> CallState {
        CallState::new(0, 0, CallPhase::Dialing)
    }

    fn alerting() -> CallState {
        CallState::new(0, 0, CallPhase::Alerting)
    }

    fn active() -> CallState {
        CallState::new(1, 0, CallPhase::Idle)
    }

    #[test]
    fn dialing_is_forwarded() {
        let mut sync = CallSynchronizer::new();
        let steps = sync.on_call_state_changed(&CallState::idle(), dialing());
        assert_eq!(steps, vec![SyncStep::Forward(dialing())]);
        assert!(sync.is_empty());
    }

    #[test]
    fn alerting_held_until_timeout() {
        let mut sync = CallSynchronizer::new();
        let steps = sync.on_call_state_changed(&dialing(), alerting());
        assert_eq!(steps, vec![SyncStep::ArmAlerting]);
        assert!(sync.alerting_queued());

        // A duplicate is dropped instead of queued twice.
        assert!(sync.on_call_state_changed(&dialing(), alerting()).is_empty());

        assert_eq!(sync.on_alerting_timeout(), vec![SyncStep::Forward(alerting())]);
        assert!(sync.is_empty());
        assert!(sync.on_alerting_timeout().is_empty());
    }

    #[test]
    fn active_waits_behind_alerting() {
        let mut sync = CallSynchronizer::new();
        sync.on_call_state_changed(&dialing(), alerting());
        assert!(sync.on_call_state_changed(&dialing(), active()).is_empty());

        assert_eq!(
            sync.on_alerting_timeout(),
            vec![SyncStep::Forward(alerting()), SyncStep::ArmActive]
        );
        assert_eq!(*sync.state(), SyncState::ActiveQueued { active: active() });
        assert_eq!(sync.on_active_timeout(), vec![SyncStep::Forward(active())]);
        assert!(sync.is_empty());
    }

    #[test]
    fn active_without_alerting_arms_timer() {
        let mut sync = CallSynchronizer::new();
        assert_eq!(sync.on_call_state_changed(&alerting(), active()), vec![SyncStep::ArmActive]);
        assert_eq!(sync.on_active_timeout(), vec![SyncStep::Forward(active())]);
    }

    #[test]
    fn aborted_setup_still_shows_alerting() {
        let mut sync = CallSynchronizer::new();
        sync.on_call_state_changed(&dialing(), alerting());
        let steps = sync.on_call_state_changed(&dialing(), CallState::idle());
        assert_eq!(
            steps,
            vec![
                SyncStep::CancelAlerting,
                SyncStep::Forward(alerting()),
                SyncStep::Forward(CallState::idle())
            ]
        );
        assert!(sync.is_empty());
    }

    #[test]
    fn other_update_flushes_in_order() {
        let mut sync = CallSynchronizer::new();
        sync.on_call_state_changed(&dialing(), alerting());
        sync.on_call_state_changed(&dialing(), active());

        let incoming = CallState::new(1, 0, CallPhase::Incoming);
        let steps = sync.on_call_state_changed(&dialing(), incoming.clone());
        assert_eq!(
            steps,
            vec![
                SyncStep::CancelAlerting,
                SyncStep::Forward(alerting()),
                SyncStep::Forward(active()),
                SyncStep::Forward(incoming)
            ]
        );
    }

    #[test]
    fn flush_empty_is_noop() {
        let mut sync = CallSynchronizer::new();
        assert!(sync.flush().is_empty());
        assert!(sync.flush().is_empty());
    }

    #[test]
    fn media_cache() {
        let a = RawAddress::new([1, 1, 1, 1, 1, 1]);
        let mut media = MediaSync::new();
        assert!(!media.set_playing(a, true));
        assert!(media.is_connected());
        assert!(media.is_playing());

        media.cache(dialing());
        media.cache(alerting());
        assert!(media.pending_ciev());
        assert_eq!(media.take_cached(), vec![dialing(), alerting()]);
        assert!(!media.pending_ciev());

        assert!(media.set_playing(a, false));
        media.set_connected(a, false);
        assert!(!media.is_connected());
    }
}
