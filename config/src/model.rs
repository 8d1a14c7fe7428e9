// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! The submitted workload manifest.
//!
//! Field names follow the wire format operators already write:
//!
//! ```yaml
//! kind: TrexConfig
//! metadata:
//!   name: t1
//!   image: trex:v3
//! spec:
//!   mgmtIP: 10.0.0.5/24
//!   mgmtGateway: 10.0.0.1
//!   parentInterface: eno1
//!   port:
//!     - vfIndex: 0
//!       vlanId: 100
//! ```

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use trex_net::Vid;

/// A complete submitted workload description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrexWorkload {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: WorkloadSpec,
}

/// Workload identity: unique name plus the worker image reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
}

/// How the workload's data-plane ports are realized.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Management veth on the bridge only; no VF programming.
    #[serde(rename = "BRIDGE")]
    Bridge,
    /// SR-IOV VFs of `parentInterface`, VLAN-tagged per port.
    #[default]
    #[serde(rename = "SRIOV")]
    Sriov,
}

/// The `spec` section of a workload manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Bridge the management veth attaches to.  Defaults to `trex-br0`.
    #[serde(rename = "brName", default)]
    pub bridge_name: String,
    /// Management address, CIDR form; a bare address is treated as /32.
    #[serde(rename = "mgmtIP", default)]
    pub mgmt_ip: String,
    /// Default gateway installed inside the pause netns.
    #[serde(rename = "mgmtGateway", default)]
    pub mgmt_gateway: Option<Ipv4Addr>,
    #[serde(rename = "networkType", default)]
    pub network_type: NetworkType,
    /// Physical NIC whose VFs are consumed.  Required for SRIOV.
    ///
    /// `parantInterface` is the (misspelled) tag the original manifests
    /// used; accepted as an alias for compatibility.
    #[serde(
        rename = "parentInterface",
        alias = "parantInterface",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_interface: Option<String>,
    #[serde(default)]
    pub port: Vec<Port>,
}

/// One data-plane port of the workload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Port {
    #[serde(rename = "ifName", default, skip_serializing_if = "Option::is_none")]
    pub if_name: Option<String>,
    #[serde(rename = "vfIndex", default)]
    pub vf_index: u32,
    /// Port address written into the TRex config.  Synthesized when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Net>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    #[serde(rename = "vlanId", default)]
    pub vlan_id: Vid,
}

impl TrexWorkload {
    /// The management address with host bits padded to `/32` when the
    /// manifest omitted a prefix.
    ///
    /// # Errors
    ///
    /// Returns the padded string back if it does not parse as an IPv4 CIDR.
    pub fn mgmt_net(&self) -> Result<Ipv4Net, String> {
        let raw = &self.spec.mgmt_ip;
        let padded = if raw.contains('/') {
            raw.clone()
        } else {
            format!("{raw}/32")
        };
        padded.parse::<Ipv4Net>().map_err(|_| padded)
    }
}
