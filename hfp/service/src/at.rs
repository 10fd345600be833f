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

//! Turns AT command lines typed for a simulated peer into transport events.

use hfp_ag::transport::{CallControl, IndicatorQuery, TransportEvent, VolumeType};
use hfp_ag::RawAddress;

/// Key code of the headset button in `+CKPD`.
const HEADSET_KEY: &str = "200";

/// Parses one AT command line, with or without the leading `AT`. Commands the gateway handles
/// natively become typed events, everything else is passed on as an unknown command.
pub fn parse_at(addr: RawAddress, line: &str) -> TransportEvent {
    let line = line.trim();
    let body = match line.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("AT") => &line[2..],
        _ => line,
    };
    let upper = body.to_ascii_uppercase();

    let control = |request| TransportEvent::CallControl { addr, request };
    let query = |query| TransportEvent::IndicatorQuery { addr, query };

    match upper.as_str() {
        "A" => return control(CallControl::Answer),
        "+CHUP" => return control(CallControl::Hangup),
        "+BLDN" => return control(CallControl::Dial(String::new())),
        "+CNUM" => return control(CallControl::SubscriberNumber),
        "+CIND?" => return query(IndicatorQuery::CurrentState),
        "+COPS?" => return query(IndicatorQuery::OperatorName),
        "+CLCC" => return query(IndicatorQuery::CurrentCalls),
        "+BVRA=1" => return TransportEvent::VoiceRecognitionChanged { addr, started: true },
        "+BVRA=0" => return TransportEvent::VoiceRecognitionChanged { addr, started: false },
        "+NREC=0" => return TransportEvent::NoiseReductionChanged { addr, enabled: false },
        _ => {}
    }

    if let Some(number) = upper.strip_prefix('D') {
        return control(CallControl::Dial(number.to_string()));
    }
    if let Some(code) = upper.strip_prefix("+VTS=").and_then(|c| c.chars().next()) {
        return control(CallControl::SendDtmf(code));
    }
    if let Some(Ok(chld)) = upper.strip_prefix("+CHLD=").map(str::parse::<u32>) {
        return control(CallControl::Chld(chld));
    }
    if upper.strip_prefix("+CKPD=") == Some(HEADSET_KEY) {
        return control(CallControl::KeyPress);
    }
    for (prefix, kind) in [("+VGS=", VolumeType::Speaker), ("+VGM=", VolumeType::Microphone)] {
        if let Some(Ok(volume)) = upper.strip_prefix(prefix).map(str::parse::<u8>) {
            return TransportEvent::VolumeChanged { addr, kind, volume };
        }
    }

    TransportEvent::UnknownCommand { addr, raw: body.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: RawAddress = RawAddress::new([1, 2, 3, 4, 5, 6]);

    fn control(request: CallControl) -> TransportEvent {
        TransportEvent::CallControl { addr: A, request }
    }

    #[test]
    fn call_control() {
        assert_eq!(parse_at(A, "ATA"), control(CallControl::Answer));
        assert_eq!(parse_at(A, "at+chup"), control(CallControl::Hangup));
        assert_eq!(parse_at(A, "ATD5551234;"), control(CallControl::Dial("5551234;".into())));
        assert_eq!(parse_at(A, "ATD>1"), control(CallControl::Dial(">1".into())));
        assert_eq!(parse_at(A, "AT+BLDN"), control(CallControl::Dial(String::new())));
        assert_eq!(parse_at(A, "AT+CHLD=2"), control(CallControl::Chld(2)));
        assert_eq!(parse_at(A, "AT+VTS=5"), control(CallControl::SendDtmf('5')));
        assert_eq!(parse_at(A, "AT+CKPD=200"), control(CallControl::KeyPress));
    }

    #[test]
    fn queries_and_settings() {
        assert_eq!(
            parse_at(A, "AT+CLCC"),
            TransportEvent::IndicatorQuery { addr: A, query: IndicatorQuery::CurrentCalls }
        );
        assert_eq!(
            parse_at(A, "AT+VGS=9"),
            TransportEvent::VolumeChanged { addr: A, kind: VolumeType::Speaker, volume: 9 }
        );
        assert_eq!(
            parse_at(A, "AT+BVRA=1"),
            TransportEvent::VoiceRecognitionChanged { addr: A, started: true }
        );
    }

    #[test]
    fn unknown_keeps_original_case() {
        assert_eq!(
            parse_at(A, "AT+XAPL=abcd-0001,10"),
            TransportEvent::UnknownCommand { addr: A, raw: "+XAPL=abcd-0001,10".into() }
        );
        assert_eq!(
            parse_at(A, "AT+CHLD=x"),
            TransportEvent::UnknownCommand { addr: A, raw: "+CHLD=x".into() }
        );
    }
}
