// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! PCI device addresses in `[domain:]bus:device.function` form.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A PCI address as DPDK and TRex consume it: `dddd:bb:dd.f`.
///
/// Parsing accepts the short `bb:dd.f` form found in some sysfs paths and
/// normalizes it to the zero-domain long form.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

/// Errors which can occur when parsing a [`PciAddress`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum InvalidPciAddress {
    /// The string does not split into `[domain:]bus:device.function`.
    #[error("'{0}' is not of the form [domain:]bus:device.function")]
    BadShape(String),
    /// A component failed to parse as hex or exceeded its field width.
    #[error("bad {field} in PCI address '{address}'")]
    BadField {
        field: &'static str,
        address: String,
    },
}

impl PciAddress {
    /// Parse a PCI address, accepting both the long and the short form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `[domain:]bus:device.function`
    /// with in-range hex components (device is 5 bits, function is 3).
    pub fn parse(s: &str) -> Result<Self, InvalidPciAddress> {
        let bad_field = |field| InvalidPciAddress::BadField {
            field,
            address: s.to_string(),
        };

        let mut parts: Vec<&str> = s.split(':').collect();
        let domain = match parts.len() {
            2 => 0,
            3 => u16::from_str_radix(parts.remove(0), 16).map_err(|_| bad_field("domain"))?,
            _ => return Err(InvalidPciAddress::BadShape(s.to_string())),
        };
        let bus = u8::from_str_radix(parts[0], 16).map_err(|_| bad_field("bus"))?;
        let (device, function) = parts[1]
            .split_once('.')
            .ok_or_else(|| InvalidPciAddress::BadShape(s.to_string()))?;
        let device = u8::from_str_radix(device, 16).map_err(|_| bad_field("device"))?;
        if device > 0x1f {
            return Err(bad_field("device"));
        }
        let function = u8::from_str_radix(function, 16).map_err(|_| bad_field("function"))?;
        if function > 0x7 {
            return Err(bad_field("function"));
        }
        Ok(PciAddress {
            domain,
            bus,
            device,
            function,
        })
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        PciAddress::parse(s)
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PciAddress::parse(&s)
    }
}

impl std::str::FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PciAddress::parse(s)
    }
}

impl From<PciAddress> for String {
    fn from(addr: PciAddress) -> String {
        addr.to_string()
    }
}
