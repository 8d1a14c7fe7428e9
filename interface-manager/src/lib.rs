// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Host network programming for TRex workloads.
//!
//! Everything that mutates kernel networking state lives here: the netlink
//! capability surface, bridge management, the veth/VF plumbing sequence,
//! network namespace entry, and sysfs-based VF PCI resolution.

pub mod bridge;
pub mod netlink;
pub mod netns;
pub mod plumber;
pub mod sysfs;

pub use bridge::{BridgeHandle, BridgeManager, DEFAULT_MTU};
pub use netlink::{NetlinkError, NetlinkOps};
pub use netns::{NetnsError, with_netns};
pub use plumber::{MGMT_IFNAME, NetworkPlumber, PlumbError, PlumbRequest, VfPort, name9, veth_names};
pub use sysfs::{SysfsError, SysfsResolver};
