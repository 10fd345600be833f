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

//! Hands-free profile audio gateway control plane.
//!
//! The gateway arbitrates connections from up to two hands-free peers, the single audio link
//! they share and the call indicators they are sent.
//!
//! ```text
//!   local requests      telephony/media       transport events     timer expiries
//!         \                    |                     |                   /
//!          +-------------------+---- Message --------+------------------+
//!                                       |
//!                                  HfpDriver  <---- Outcome / deferred replay
//!                                       |
//!                          HeadsetStateMachine::process(Event)
//!                                       |
//!                                  Vec<Action>
//!                                       |
//!        +-------------+---------------+---------------+--------------+
//!   IHfpTransport  IAudioSystem    ITelephony    IHfpCallback       Timers
//! ```
//!
//! The state machine is pure: it never performs I/O and can be driven directly in tests. The
//! driver runs on tokio and executes its actions against the collaborators.

pub mod actions;
pub mod address;
pub mod audio;
pub mod call_sync;
pub mod callbacks;
pub mod config;
pub mod driver;
pub mod events;
pub mod policy;
pub mod registry;
pub mod sco;
pub mod state_machine;
pub mod status;
pub mod telephony;
pub mod timers;
pub mod transport;

pub use crate::address::RawAddress;
pub use crate::config::HfpConfig;
pub use crate::driver::{HfpDriver, HfpRunner};
pub use crate::events::{Event, Outcome};
pub use crate::state_machine::{HeadsetStateMachine, HfpState};
pub use crate::timers::TimerId;

/// Closure run on the driver's task with access to the driver.
pub type DriverCallback = Box<dyn FnOnce(&mut HfpDriver) + Send + 'static>;

/// Everything that enters the driver's message channel.
pub enum Message {
    Event(Event),
    /// Timer expiry tagged with the generation it was armed with.
    Timer(TimerId, u64),
    Call(DriverCallback),
    Shutdown,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Event(event) => write!(f, "Event({:?})", event),
            Message::Timer(id, generation) => write!(f, "Timer({:?}, {})", id, generation),
            Message::Call(_) => write!(f, "Call"),
            Message::Shutdown => write!(f, "Shutdown"),
        }
    }
}
