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

//! Interactive commands read from stdin.

use num_traits::FromPrimitive;

use hfp_ag::policy::{BondState, Priority};
use hfp_ag::registry::Codec;
use hfp_ag::telephony::DeviceStatus;
use hfp_ag::transport::{HfAudioState, HfConnectionState, TransportEvent};
use hfp_ag::{Event, RawAddress};

use crate::at::parse_at;
use crate::collaborators::CallStep;

pub const HELP: &str = "\
Local requests:
  connect <addr> | disconnect <addr>
  audio <on|off>
  vr <start|stop> | virtual <start|stop>
  volume <0-15> | route <on|off> | force-sco <on|off>
  codec <addr> <wb|nb> | vendor <addr> <command> <arg>
  device <service> <roam> <signal> <battery>
  media <addr> <connected|disconnected|playing|stopped>
  call-type <cellular|voip> | audio-restart
Phone:
  call <dialing|alerting|incoming|active|held|idle> [number]
  operator [name] | subscriber [number]
Device store:
  bond <addr> | unbond <addr> | priority <addr> <value>
Simulated peers:
  link <addr> <disconnected|connecting|connected|slc|disconnecting>
  sco <addr> <disconnected|connecting|connected|disconnecting>
  at <addr> <command>
  features <addr> <bits> | negotiated <addr> <wb|nb>
Other:
  dump | devices | help | quit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Event(Event),
    Call(CallStep, String),
    Operator(Option<String>),
    Subscriber(Option<String>),
    Bond(RawAddress, BondState),
    Priority(RawAddress, Priority),
    Dump,
    Devices,
    Help,
    Quit,
}

fn addr(arg: Option<&str>) -> Result<RawAddress, String> {
    let arg = arg.ok_or("missing address")?;
    RawAddress::from_string(arg).ok_or_else(|| format!("invalid address: {}", arg))
}

fn switch(arg: Option<&str>) -> Result<bool, String> {
    match arg {
        Some("on") | Some("1") | Some("start") => Ok(true),
        Some("off") | Some("0") | Some("stop") => Ok(false),
        other => Err(format!("expected on or off, got {:?}", other)),
    }
}

fn number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    arg.and_then(|a| a.parse().ok()).ok_or_else(|| format!("invalid {}: {:?}", what, arg))
}

fn link_state(arg: Option<&str>) -> Result<HfConnectionState, String> {
    match arg {
        Some("disconnected") => Ok(HfConnectionState::Disconnected),
        Some("connecting") => Ok(HfConnectionState::Connecting),
        Some("connected") => Ok(HfConnectionState::Connected),
        Some("slc") => Ok(HfConnectionState::SlcConnected),
        Some("disconnecting") => Ok(HfConnectionState::Disconnecting),
        other => Err(format!("unknown link state {:?}", other)),
    }
}

fn audio_state(arg: Option<&str>) -> Result<HfAudioState, String> {
    match arg {
        Some("disconnected") => Ok(HfAudioState::Disconnected),
        Some("connecting") => Ok(HfAudioState::Connecting),
        Some("connected") => Ok(HfAudioState::Connected),
        Some("disconnecting") => Ok(HfAudioState::Disconnecting),
        other => Err(format!("unknown audio state {:?}", other)),
    }
}

fn call_step(arg: Option<&str>) -> Result<CallStep, String> {
    match arg {
        Some("dialing") => Ok(CallStep::Dialing),
        Some("alerting") => Ok(CallStep::Alerting),
        Some("incoming") => Ok(CallStep::Incoming),
        Some("active") => Ok(CallStep::Active),
        Some("held") => Ok(CallStep::Held),
        Some("idle") => Ok(CallStep::Idle),
        other => Err(format!("unknown call step {:?}", other)),
    }
}

/// Parses one shell line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut args = line.split_whitespace();
    let Some(name) = args.next() else {
        return Ok(None);
    };

    let command = match name {
        "connect" => Command::Event(Event::Connect(addr(args.next())?)),
        "disconnect" => Command::Event(Event::Disconnect(addr(args.next())?)),
        "audio" => match switch(args.next())? {
            true => Command::Event(Event::ConnectAudio),
            false => Command::Event(Event::DisconnectAudio),
        },
        "vr" => match switch(args.next())? {
            true => Command::Event(Event::StartVoiceRecognition),
            false => Command::Event(Event::StopVoiceRecognition),
        },
        "virtual" => match switch(args.next())? {
            true => Command::Event(Event::StartVirtualCall),
            false => Command::Event(Event::StopVirtualCall),
        },
        "volume" => Command::Event(Event::SetVolume(number(args.next(), "volume")?)),
        "route" => Command::Event(Event::SetAudioRouteAllowed(switch(args.next())?)),
        "force-sco" => Command::Event(Event::SetForceScoAudio(switch(args.next())?)),
        "codec" => {
            let addr = addr(args.next())?;
            let wideband = match args.next() {
                Some("wb") => true,
                Some("nb") => false,
                other => return Err(format!("expected wb or nb, got {:?}", other)),
            };
            Command::Event(Event::SetCodecEnabled { addr, wideband })
        }
        "vendor" => {
            let addr = addr(args.next())?;
            let command = args.next().ok_or("missing vendor command")?.to_string();
            let arg = args.collect::<Vec<_>>().join(" ");
            Command::Event(Event::SendVendorResultCode { addr, command, arg })
        }
        "device" => {
            let service: u8 = number(args.next(), "service")?;
            let roam: u8 = number(args.next(), "roam")?;
            let signal = number(args.next(), "signal")?;
            let battery = number(args.next(), "battery")?;
            let status = DeviceStatus { service: service != 0, roam: roam != 0, signal, battery };
            Command::Event(Event::DeviceStateChanged(status))
        }
        "media" => {
            let addr = addr(args.next())?;
            let event = match args.next() {
                Some("connected") => Event::MediaConnectionChanged { addr, connected: true },
                Some("disconnected") => Event::MediaConnectionChanged { addr, connected: false },
                Some("playing") => Event::MediaPlaybackChanged { addr, playing: true },
                Some("stopped") => Event::MediaPlaybackChanged { addr, playing: false },
                other => return Err(format!("unknown media state {:?}", other)),
            };
            event.into()
        }
        "call-type" => match args.next() {
            Some("cellular") => Command::Event(Event::CallTypeChanged { cellular: true }),
            Some("voip") => Command::Event(Event::CallTypeChanged { cellular: false }),
            other => return Err(format!("unknown call type {:?}", other)),
        },
        "audio-restart" => Command::Event(Event::AudioServerRestarted),
        "call" => {
            let step = call_step(args.next())?;
            Command::Call(step, args.next().unwrap_or_default().to_string())
        }
        "operator" => Command::Operator(args.next().map(String::from)),
        "subscriber" => Command::Subscriber(args.next().map(String::from)),
        "bond" => Command::Bond(addr(args.next())?, BondState::Bonded),
        "unbond" => Command::Bond(addr(args.next())?, BondState::NotBonded),
        "priority" => {
            let addr = addr(args.next())?;
            let value: i32 = number(args.next(), "priority")?;
            let priority =
                Priority::from_i32(value).ok_or_else(|| format!("unknown priority {}", value))?;
            Command::Priority(addr, priority)
        }
        "link" => {
            let addr = addr(args.next())?;
            let state = link_state(args.next())?;
            TransportEvent::ConnectionStateChanged { addr, state }.into()
        }
        "sco" => {
            let addr = addr(args.next())?;
            let state = audio_state(args.next())?;
            TransportEvent::AudioStateChanged { addr, state }.into()
        }
        "at" => {
            let addr = addr(args.next())?;
            let line = args.collect::<Vec<_>>().join(" ");
            if line.is_empty() {
                return Err("missing AT command".to_string());
            }
            parse_at(addr, &line).into()
        }
        "features" => {
            let addr = addr(args.next())?;
            let bits: u32 = number(args.next(), "features")?;
            let features = hfp_ag::registry::HfFeatures::from_bits_truncate(bits);
            TransportEvent::FeaturesReported { addr, features }.into()
        }
        "negotiated" => {
            let addr = addr(args.next())?;
            let codec = match args.next() {
                Some("wb") => Codec::Wideband,
                Some("nb") => Codec::Narrowband,
                other => return Err(format!("expected wb or nb, got {:?}", other)),
            };
            TransportEvent::CodecNegotiated { addr, codec }.into()
        }
        "dump" => Command::Dump,
        "devices" => Command::Devices,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

impl From<Event> for Command {
    fn from(event: Event) -> Self {
        Command::Event(event)
    }
}

impl From<TransportEvent> for Command {
    fn from(event: TransportEvent) -> Self {
        Command::Event(Event::Transport(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfp_ag::transport::CallControl;

    const A: RawAddress = RawAddress::new([0, 0x11, 0x22, 0x33, 0x44, 0x55]);

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn local_requests() {
        assert_eq!(parse("connect 00:11:22:33:44:55"), Command::Event(Event::Connect(A)));
        assert_eq!(parse("audio on"), Command::Event(Event::ConnectAudio));
        assert_eq!(parse("force-sco off"), Command::Event(Event::SetForceScoAudio(false)));
        assert_eq!(
            parse("vendor 00:11:22:33:44:55 +ANDROID hello there"),
            Command::Event(Event::SendVendorResultCode {
                addr: A,
                command: "+ANDROID".into(),
                arg: "hello there".into(),
            })
        );
    }

    #[test]
    fn peers_and_store() {
        assert_eq!(
            parse("link 00:11:22:33:44:55 slc"),
            Command::Event(Event::Transport(TransportEvent::ConnectionStateChanged {
                addr: A,
                state: HfConnectionState::SlcConnected,
            }))
        );
        assert_eq!(
            parse("at 00:11:22:33:44:55 ATA"),
            Command::Event(Event::Transport(TransportEvent::CallControl {
                addr: A,
                request: CallControl::Answer,
            }))
        );
        assert_eq!(parse("priority 00:11:22:33:44:55 0"), Command::Priority(A, Priority::Off));
        assert_eq!(
            parse("call incoming 5551234"),
            Command::Call(CallStep::Incoming, "5551234".into())
        );
    }

    #[test]
    fn errors() {
        assert_eq!(parse_command("   "), Ok(None));
        assert!(parse_command("connect nope").is_err());
        assert!(parse_command("priority 00:11:22:33:44:55 7").is_err());
        assert!(parse_command("frobnicate").is_err());
    }
}
