// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Idempotent bridge management.

use crate::netlink::{NetlinkError, NetlinkOps};
use tracing::info;
use trex_net::InterfaceName;

/// MTU used for the bridge and the management veth pair.
pub const DEFAULT_MTU: u32 = 1500;

/// A bridge known to exist and be up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeHandle {
    pub name: InterfaceName,
    pub index: u32,
}

/// Ensures named bridges exist with the required attributes.
///
/// The bridge is shared between workloads and is never removed when a
/// single workload goes away.
#[derive(Clone)]
pub struct BridgeManager {
    ops: NetlinkOps,
}

impl BridgeManager {
    #[must_use]
    pub fn new(ops: NetlinkOps) -> Self {
        BridgeManager { ops }
    }

    /// Idempotently ensure `name` exists as a bridge and is up.
    ///
    /// Repeated calls for the same name return the same handle.  A link of
    /// the same name that is not a bridge is a fatal precondition error
    /// the operator must resolve manually.
    ///
    /// # Errors
    ///
    /// Returns [`NetlinkError::NotABridge`] for a squatted name, or the
    /// underlying netlink failure.
    pub async fn ensure(&self, name: &InterfaceName) -> Result<BridgeHandle, NetlinkError> {
        let index = self
            .ops
            .ensure_bridge(name.as_ref(), DEFAULT_MTU, false)
            .await?;
        info!("bridge {name} ready (ifindex {index})");
        Ok(BridgeHandle {
            name: name.clone(),
            index,
        })
    }
}
