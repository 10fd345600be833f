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

//! Timeout supervisor. Every timer runs as its own task that sleeps and then posts a
//! `Message::Timer` back into the main loop, so expiries are serialized with everything else.

use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time;

use crate::address::RawAddress;
use crate::Message;

/// Identifies one pending timeout by purpose and, where relevant, peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Bounds the time spent waiting for an outgoing connection.
    Connect(RawAddress),
    /// Back-off before the single automatic reconnect attempt.
    ConnectRetry(RawAddress),
    Dialing(RawAddress),
    VoiceRecognitionStart(RawAddress),
    CurrentCalls(RawAddress),
    QueryPhoneState,
    IncomingCallIndication,
    CallAlerting,
    CallActive,
    VirtualAlerting,
    VirtualActive,
}

/// Armed timers. Re-arming a timer replaces the earlier one, and each arm gets a fresh
/// generation so that an expiry already queued for a replaced or cancelled timer is dropped.
pub struct Timers {
    tx: Sender<Message>,
    armed: HashMap<TimerId, (u64, JoinHandle<()>)>,
    generation: u64,
}

impl Timers {
    pub fn new(tx: Sender<Message>) -> Self {
        Self { tx, armed: HashMap::new(), generation: 0 }
    }

    pub fn arm(&mut self, id: TimerId, delay: Duration) {
        self.cancel(id);
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(Message::Timer(id, generation)).await;
        });
        self.armed.insert(id, (generation, handle));
    }

    /// Returns true if the timer was armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.armed.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, id: &TimerId) -> bool {
        self.armed.contains_key(id)
    }

    /// Consumes an expiry. Returns false when it belongs to a timer that was cancelled or
    /// re-armed after this expiry was queued.
    pub fn claim(&mut self, id: TimerId, generation: u64) -> bool {
        match self.armed.get(&id) {
            Some((current, _)) if *current == generation => {
                self.armed.remove(&id);
                true
            }
            _ => {
                debug!("Dropping stale timer {:?} ({})", id, generation);
                false
            }
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    const A: RawAddress = RawAddress::new([0xa, 0, 0, 0, 0, 1]);

    #[tokio::test(start_paused = true)]
    async fn fires_once() {
        let (tx, mut rx) = channel(8);
        let mut timers = Timers::new(tx);
        timers.arm(TimerId::Connect(A), Duration::from_millis(100));
        assert!(timers.is_armed(&TimerId::Connect(A)));

        let Some(Message::Timer(id, generation)) = rx.recv().await else {
            panic!("expected a timer message");
        };
        assert_eq!(id, TimerId::Connect(A));
        assert!(timers.claim(id, generation));
        assert!(!timers.is_armed(&TimerId::Connect(A)));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_drops_stale_expiry() {
        let (tx, mut rx) = channel(8);
        let mut timers = Timers::new(tx);
        timers.arm(TimerId::CallAlerting, Duration::from_millis(10));
        time::sleep(Duration::from_millis(20)).await;

        // The first expiry is queued, the re-arm supersedes it.
        timers.arm(TimerId::CallAlerting, Duration::from_millis(10));
        let Some(Message::Timer(id, stale)) = rx.recv().await else {
            panic!("expected a timer message");
        };
        assert!(!timers.claim(id, stale));

        let Some(Message::Timer(id, fresh)) = rx.recv().await else {
            panic!("expected a timer message");
        };
        assert!(timers.claim(id, fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_timer() {
        let (tx, mut rx) = channel(8);
        let mut timers = Timers::new(tx);
        timers.arm(TimerId::QueryPhoneState, Duration::from_millis(10));
        assert!(timers.cancel(TimerId::QueryPhoneState));
        assert!(!timers.cancel(TimerId::QueryPhoneState));

        time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
