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

use num_derive::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Result of a request handed to an external collaborator.
#[derive(Clone, Copy, Debug, FromPrimitive, ToPrimitive, PartialEq, Eq)]
#[repr(u32)]
pub enum BtStatus {
    Success = 0,
    Fail,
    NotReady,
    NoMemory,
    Busy,
    Done,
    Unsupported,
    InvalidParam,
    Unhandled,
    AuthFailure,
    RemoteDeviceDown,
    AuthRejected,
    JniEnvironmentError,
    JniThreadAttachError,
    WakeLockError,
    Timeout,
    DeviceNotFound,
    UnexpectedState,
    SocketError,

    // Any statuses that couldn't be cleanly converted
    Unknown = 0xff,
}

impl fmt::Display for BtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<u32> for BtStatus {
    fn from(item: u32) -> Self {
        num_traits::FromPrimitive::from_u32(item).unwrap_or(BtStatus::Unknown)
    }
}

/// Converts a raw status into a `Result`, treating anything but `Success` as an error.
pub fn status_to_result(status: BtStatus) -> Result<(), BtStatus> {
    match status {
        BtStatus::Success => Ok(()),
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw() {
        assert_eq!(BtStatus::from(0), BtStatus::Success);
        assert_eq!(BtStatus::from(4), BtStatus::Busy);
        assert_eq!(BtStatus::from(1234), BtStatus::Unknown);
        assert_eq!(status_to_result(BtStatus::Success), Ok(()));
        assert_eq!(status_to_result(BtStatus::NotReady), Err(BtStatus::NotReady));
    }
}
