// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! VLAN identifier validation.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A VLAN Identifier as programmed into an SR-IOV VF table.
///
/// This type is marked `#[repr(transparent)]` to ensure that it has the
/// same memory layout as a `u16`; the overhead of using it is strictly
/// limited to the one-time check that the value is a legal VLAN id.
///
/// Unlike an 802.1Q tag on the wire, 0 is legal here: programming VLAN 0
/// on a VF clears the tag (untagged traffic).
#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct Vid(u16);

/// Errors which can occur when converting a `u16` to a validated [`Vid`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum InvalidVid {
    /// 4095 is a reserved VLAN id per 802.1Q.
    #[error("4095 is a reserved VLAN id")]
    Reserved,
    /// The value is too large to be a legal VLAN id (12-bit max).
    #[error("{0} is too large to be a legal VLAN id ({MAX} is the max legal value)", MAX = Vid::MAX)]
    TooLarge(u16),
}

impl Vid {
    /// The raw `u16` value of the reserved (4095) VLAN id.
    pub const RESERVED: u16 = 4095;

    /// The minimum legal [`Vid`] value (0, meaning untagged).
    pub const MIN: Vid = Vid(0);

    /// The maximum legal [`Vid`] value (4094).
    pub const MAX: Vid = Vid(4094);

    /// Create a new [`Vid`] from a `u16`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is 4095 (reserved) or larger.
    pub fn new(vid: u16) -> Result<Self, InvalidVid> {
        match vid {
            Self::RESERVED => Err(InvalidVid::Reserved),
            v if v > Self::RESERVED => Err(InvalidVid::TooLarge(v)),
            v => Ok(Vid(v)),
        }
    }

    /// Get the value of the [`Vid`] as a `u16`.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self.0
    }
}

impl Display for Vid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Vid> for u16 {
    fn from(vid: Vid) -> u16 {
        vid.to_u16()
    }
}

impl TryFrom<u16> for Vid {
    type Error = InvalidVid;

    fn try_from(vid: u16) -> Result<Vid, Self::Error> {
        Vid::new(vid)
    }
}
