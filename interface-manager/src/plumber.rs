// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Workload network plumbing.
//!
//! The riskiest sequence in the controller: it spans two network
//! namespaces and the parent NIC's VF table, and every step before the
//! last leaves host state that delete or compensation must find again.
//! Veth names are therefore a pure function of the workload name.

use crate::bridge::{BridgeHandle, DEFAULT_MTU};
use crate::netlink::{NetlinkError, NetlinkOps};
use crate::netns::{NetnsError, with_netns};
use crate::sysfs::{SysfsError, SysfsResolver};
use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::fs::File;
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tracing::{debug, info};
use trex_net::{InterfaceName, PciAddress, Vid};

/// Name of the management interface inside the pause netns.
pub const MGMT_IFNAME: &str = "mgmt";

/// The workload name truncated to at most 9 bytes (on a char boundary);
/// the seed of both veth names.
#[must_use]
pub fn name9(name: &str) -> &str {
    if name.len() <= 9 {
        return name;
    }
    let mut end = 9;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Deterministic `(host, peer)` veth names for a workload, so delete and
/// compensation can locate them without bookkeeping.
#[must_use]
pub fn veth_names(workload: &str) -> (String, String) {
    let seed = name9(workload);
    (format!("trex_{seed}"), format!("tmp{seed}"))
}

/// One SR-IOV port to program.
#[derive(Clone, Copy, Debug)]
pub struct VfPort {
    pub vf_index: u32,
    pub vlan: Vid,
}

/// Everything the plumber needs to wire one workload.
#[derive(Clone, Debug)]
pub struct PlumbRequest {
    pub workload: String,
    pub pause_pid: i32,
    pub bridge: BridgeHandle,
    pub mgmt_addr: Ipv4Net,
    pub mgmt_gateway: Ipv4Addr,
    /// Parent NIC; `None` for plain bridge networking.
    pub parent: Option<InterfaceName>,
    /// Ports to program; empty for plain bridge networking.
    pub vf_ports: Vec<VfPort>,
}

/// Errors which can occur while plumbing a workload's network.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum PlumbError {
    #[error(transparent)]
    Netlink(#[from] NetlinkError),
    #[error(transparent)]
    Sysfs(#[from] SysfsError),
    #[error(transparent)]
    Netns(#[from] NetnsError),
    #[error("failed to open pause netns {path}: {source}")]
    NetnsOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("netns worker did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Creates and tears down the per-workload veth/VF wiring.
#[derive(Clone)]
pub struct NetworkPlumber {
    ops: NetlinkOps,
    sysfs: SysfsResolver,
}

impl NetworkPlumber {
    #[must_use]
    pub fn new(ops: NetlinkOps) -> Self {
        NetworkPlumber {
            ops,
            sysfs: SysfsResolver::default(),
        }
    }

    #[must_use]
    pub fn with_sysfs(ops: NetlinkOps, sysfs: SysfsResolver) -> Self {
        NetworkPlumber { ops, sysfs }
    }

    /// Wire a workload: veth pair onto the bridge, peer into the pause
    /// netns, VF VLANs on the parent NIC, management interface configured
    /// inside the namespace.  Returns the VF name → PCI address map for
    /// the TRex port configuration.
    ///
    /// # Errors
    ///
    /// Any failed step propagates; the caller (the reconciler) owns
    /// compensation.
    pub async fn plumb(
        &self,
        request: &PlumbRequest,
    ) -> Result<BTreeMap<String, PciAddress>, PlumbError> {
        let (host, peer) = veth_names(&request.workload);
        info!(
            "plumbing workload {}: veth {host} <-> {peer} on bridge {}",
            request.workload, request.bridge.name
        );

        let (host_index, peer_index) = self
            .ops
            .create_veth_pair(&host, &peer, DEFAULT_MTU)
            .await?;
        self.ops
            .attach_to_bridge(host_index, &host, request.bridge.index)
            .await?;
        self.ops.set_up(host_index, &host).await?;

        let netns_path = PathBuf::from(format!("/proc/{}/ns/net", request.pause_pid));
        let netns_file = File::open(&netns_path).map_err(|source| PlumbError::NetnsOpen {
            path: netns_path.clone(),
            source,
        })?;
        self.ops
            .set_ns_fd(peer_index, &peer, netns_file.as_raw_fd())
            .await?;

        // VF VLANs are programmed in the host namespace, on the parent
        // link; only the management veth work happens inside the netns.
        let mut vf_pci = BTreeMap::new();
        if let Some(parent) = &request.parent {
            for port in &request.vf_ports {
                let vf_name = SysfsResolver::vf_name(parent, port.vf_index);
                let pci = self.sysfs.resolve_vf_pci(parent, port.vf_index)?;
                debug!("VF {vf_name} resolved to PCI {pci}");
                self.ops
                    .set_vf_vlan(parent.as_ref(), port.vf_index, port.vlan)
                    .await?;
                vf_pci.insert(vf_name, pci);
            }
        }

        self.configure_mgmt(netns_path, peer, request.mgmt_addr, request.mgmt_gateway)
            .await?;
        Ok(vf_pci)
    }

    /// Inside the pause netns: rename the peer to `mgmt`, bring it up,
    /// assign the management address, install the default route.
    async fn configure_mgmt(
        &self,
        netns_path: PathBuf,
        peer: String,
        addr: Ipv4Net,
        gateway: Ipv4Addr,
    ) -> Result<(), PlumbError> {
        let outcome = tokio::task::spawn_blocking(move || {
            with_netns(&netns_path, move || -> Result<(), NetlinkError> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_io()
                    .enable_time()
                    .build()?;
                runtime.block_on(async move {
                    let ops = NetlinkOps::new()?;
                    let index =
                        ops.link_index(&peer)
                            .await?
                            .ok_or_else(|| NetlinkError::LinkNotFound {
                                name: peer.clone(),
                            })?;
                    ops.rename(index, &peer, MGMT_IFNAME).await?;
                    ops.set_up(index, MGMT_IFNAME).await?;
                    ops.assign_addr(index, MGMT_IFNAME, addr).await?;
                    ops.add_default_route(gateway).await?;
                    Ok(())
                })
            })
        })
        .await?;
        outcome??;
        Ok(())
    }

    /// Remove the host-side veth of a workload.  Deleting one end removes
    /// the pair; a link that is already gone is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion itself fails.
    pub async fn teardown(&self, workload: &str) -> Result<(), NetlinkError> {
        let (host, _) = veth_names(workload);
        info!("deleting host veth {host} for workload {workload}");
        self.ops.delete_link_by_name(&host).await
    }
}
