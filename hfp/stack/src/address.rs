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

//! Peer identity.

use std::fmt;
use std::str::FromStr;

/// A Bluetooth device address, most significant byte first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawAddress {
    pub address: [u8; 6],
}

impl RawAddress {
    pub const fn new(address: [u8; 6]) -> Self {
        Self { address }
    }

    /// Parses `"aa:bb:cc:dd:ee:ff"` (case-insensitive).
    pub fn from_string<S: AsRef<str>>(addr: S) -> Option<RawAddress> {
        let parts: Vec<&str> = addr.as_ref().split(':').collect();
        if parts.len() != 6 {
            return None;
        }

        let mut address = [0u8; 6];
        for (byte, part) in address.iter_mut().zip(parts) {
            if part.len() != 2 {
                return None;
            }
            *byte = u8::from_str_radix(part, 16).ok()?;
        }
        Some(RawAddress { address })
    }

    /// Lower-case colon separated form, used for prefix matching.
    pub fn to_lower_string(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.address;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a[0], a[1], a[2], a[3], a[4], a[5])
    }
}

impl fmt::Debug for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawAddress({})", self)
    }
}

impl FromStr for RawAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RawAddress::from_string(s).ok_or_else(|| format!("invalid address: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let addr = RawAddress::from_string("00:15:83:aB:cd:EF").unwrap();
        assert_eq!(addr.address, [0x00, 0x15, 0x83, 0xab, 0xcd, 0xef]);
        assert_eq!(addr.to_string(), "00:15:83:AB:CD:EF");
        assert_eq!(addr.to_lower_string(), "00:15:83:ab:cd:ef");
    }

    #[test]
    fn reject_malformed() {
        assert!(RawAddress::from_string("00:15:83:ab:cd").is_none());
        assert!(RawAddress::from_string("00:15:83:ab:cd:gg").is_none());
        assert!(RawAddress::from_string("0:15:83:ab:cd:ef").is_none());
        assert!("not an address".parse::<RawAddress>().is_err());
    }
}
