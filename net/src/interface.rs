// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Kernel network interface names.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A validated Linux network interface name.
///
/// The kernel limits interface names to `IFNAMSIZ - 1` bytes and rejects
/// names containing `/` or whitespace.  Validating once at the boundary
/// means every consumer (netlink messages, sysfs paths, container mounts)
/// can treat the inner string as trusted.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

/// Errors which can occur when validating an [`InterfaceName`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum IllegalInterfaceName {
    /// The empty string is not a legal interface name.
    #[error("interface name may not be empty")]
    Empty,
    /// The name exceeds the kernel's `IFNAMSIZ - 1` byte limit.
    #[error("interface name '{0}' is longer than {MAX} bytes", MAX = InterfaceName::MAX_LEN)]
    TooLong(String),
    /// The name contains a byte the kernel rejects.
    #[error("interface name '{0}' contains an illegal character")]
    IllegalCharacter(String),
}

impl InterfaceName {
    /// The maximum legal length in bytes (`IFNAMSIZ - 1`).
    pub const MAX_LEN: usize = 15;

    /// Validate and wrap an interface name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, longer than
    /// [`InterfaceName::MAX_LEN`] bytes, or contains `/`, whitespace, or
    /// non-printable characters.
    pub fn new(name: impl Into<String>) -> Result<Self, IllegalInterfaceName> {
        let name = name.into();
        if name.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(name));
        }
        if !name.chars().all(|c| c.is_ascii_graphic() && c != '/') {
            return Err(IllegalInterfaceName::IllegalCharacter(name));
        }
        Ok(InterfaceName(name))
    }
}

impl Display for InterfaceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        InterfaceName::new(name)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        InterfaceName::new(name)
    }
}

impl std::str::FromStr for InterfaceName {
    type Err = IllegalInterfaceName;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        InterfaceName::new(name)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> String {
        name.0
    }
}
