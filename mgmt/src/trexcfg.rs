// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! TRex port-configuration file generation.
//!
//! TRex wants an even number of ports; each resolved VF is therefore
//! paired with a `dummy` slot carrying a throwaway address from the same
//! subnet.

use ipnet::Ipv4Net;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::info;
use trex_config::{NetworkType, TrexWorkload};
use trex_net::PciAddress;

/// Where generated configurations live on the host.
pub const DEFAULT_CFG_DIR: &str = "/tmp/trex";

/// Errors which can occur while generating the port configuration.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum CfgError {
    /// A port references a VF that was never resolved to a PCI address.
    #[error("no PCI address resolved for VF {vf}")]
    MissingVf { vf: String },
    #[error("network {net} is too small to draw a dummy address from")]
    NetworkTooSmall { net: Ipv4Net },
    #[error("failed to serialize port configuration: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One `port_info` entry.  Field names are fixed by TRex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub ip: String,
    pub default_gateway: String,
}

/// The TRex port configuration document.  Field names are fixed by TRex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrexPortConfig {
    pub port_limit: usize,
    pub version: u32,
    pub interfaces: Vec<String>,
    pub port_info: Vec<PortInfo>,
}

/// Build the port configuration for a workload from its resolved VF map.
///
/// For every port the interfaces list gets the resolved PCI address
/// followed by a `"dummy"` slot; `port_info` gets the port's address (or
/// a synthesized `192.168.<i>.<10+i>/24` one) followed by a random dummy
/// host address from the same subnet.
///
/// # Errors
///
/// [`CfgError::MissingVf`] when an SRIOV port has no entry in `vf_pci`;
/// [`CfgError::NetworkTooSmall`] when a port subnet cannot spare a dummy
/// address.
pub fn build_port_config(
    workload: &TrexWorkload,
    vf_pci: &BTreeMap<String, PciAddress>,
    rng: &mut impl Rng,
) -> Result<TrexPortConfig, CfgError> {
    // Plain bridge networking resolves no VFs and gets an empty port set;
    // TRex is then configured by the operator inside the container.
    if workload.spec.network_type != NetworkType::Sriov {
        return Ok(TrexPortConfig {
            port_limit: 0,
            version: 2,
            interfaces: Vec::new(),
            port_info: Vec::new(),
        });
    }

    let parent = workload.spec.parent_interface.as_deref().unwrap_or("");
    let port_count = workload.spec.port.len();
    let mut cfg = TrexPortConfig {
        port_limit: 2 * port_count,
        version: 2,
        interfaces: Vec::with_capacity(2 * port_count),
        port_info: Vec::with_capacity(2 * port_count),
    };

    for (i, port) in workload.spec.port.iter().enumerate() {
        let vf = format!("{parent}v{}", port.vf_index);
        let pci = vf_pci
            .get(&vf)
            .ok_or_else(|| CfgError::MissingVf { vf: vf.clone() })?;
        cfg.interfaces.push(pci.to_string());
        cfg.interfaces.push("dummy".to_string());

        let (net, gateway) = match (port.ip, port.gateway) {
            (Some(ip), Some(gateway)) => (ip, gateway),
            _ => synthesized_port_net(i),
        };
        cfg.port_info.push(PortInfo {
            ip: net.to_string(),
            default_gateway: gateway.to_string(),
        });
        let dummy = dummy_ip(net, &[net.addr(), gateway], rng)?;
        cfg.port_info.push(PortInfo {
            ip: dummy.to_string(),
            default_gateway: gateway.to_string(),
        });
    }

    Ok(cfg)
}

/// Address plan for ports that do not bring their own: one /24 per port
/// index.
fn synthesized_port_net(index: usize) -> (Ipv4Net, Ipv4Addr) {
    let octet = (index % 256) as u8;
    let host = (10 + index % 246) as u8;
    let net = Ipv4Net::new(Ipv4Addr::new(192, 168, octet, host), 24)
        .unwrap_or_else(|_| unreachable!("/24 is always a valid prefix"));
    (net, Ipv4Addr::new(192, 168, octet, 1))
}

/// Draw a random host address from `net`, excluding the network address,
/// the broadcast address, and everything in `exclude`.
///
/// A handful of random draws is attempted first; if they all collide the
/// hosts are scanned in order so the function terminates even on tiny
/// subnets.
fn dummy_ip(
    net: Ipv4Net,
    exclude: &[Ipv4Addr],
    rng: &mut impl Rng,
) -> Result<Ipv4Addr, CfgError> {
    let prefix = net.prefix_len();
    if prefix >= 31 {
        return Err(CfgError::NetworkTooSmall { net });
    }
    let network = u32::from(net.network());
    let host_count = 1u32 << (32 - prefix);

    let acceptable = |candidate: Ipv4Addr| !exclude.contains(&candidate);

    for _ in 0..64 {
        let offset = rng.random_range(1..host_count - 1);
        let candidate = Ipv4Addr::from(network + offset);
        if acceptable(candidate) {
            return Ok(candidate);
        }
    }
    // exhaustive fallback for pathologically small or crowded subnets
    (1..host_count - 1)
        .map(|offset| Ipv4Addr::from(network + offset))
        .find(|candidate| acceptable(*candidate))
        .ok_or(CfgError::NetworkTooSmall { net })
}

/// Writes generated configurations under a base directory.
#[derive(Clone, Debug)]
pub struct TrexCfgWriter {
    base_dir: PathBuf,
}

impl Default for TrexCfgWriter {
    fn default() -> Self {
        TrexCfgWriter {
            base_dir: PathBuf::from(DEFAULT_CFG_DIR),
        }
    }
}

impl TrexCfgWriter {
    /// A writer rooted somewhere other than [`DEFAULT_CFG_DIR`].
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        TrexCfgWriter {
            base_dir: base_dir.into(),
        }
    }

    /// Serialize `cfg` to `<base>/<workload>_trex_cfg.yaml` (directory
    /// 0755, file 0644) and return the path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn write(&self, workload: &str, cfg: &TrexPortConfig) -> Result<PathBuf, CfgError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| CfgError::Write { path, source }
        };

        std::fs::create_dir_all(&self.base_dir).map_err(write_err(&self.base_dir))?;
        set_mode(&self.base_dir, 0o755).map_err(write_err(&self.base_dir))?;

        // the file is a single-document sequence with one entry
        let yaml = serde_yaml_ng::to_string(&[cfg])?;
        let path = self.base_dir.join(format!("{workload}_trex_cfg.yaml"));
        std::fs::write(&path, yaml).map_err(write_err(&path))?;
        set_mode(&path, 0o644).map_err(write_err(&path))?;
        info!("wrote TRex port configuration {}", path.display());
        Ok(path)
    }
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}
