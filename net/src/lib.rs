// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Validated networking domain types shared across the controller crates.

pub mod interface;
pub mod pci;
pub mod vlan;

pub use interface::{IllegalInterfaceName, InterfaceName};
pub use pci::{InvalidPciAddress, PciAddress};
pub use vlan::{InvalidVid, Vid};
