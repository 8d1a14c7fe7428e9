// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! VF name → PCI address resolution through sysfs.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;
use trex_net::{InterfaceName, PciAddress};

/// Errors which can occur while resolving a VF's PCI address.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum SysfsError {
    /// The synthesized VF netdev does not exist under the sysfs root.
    /// Distinct from the other failures so callers can report a precise
    /// precondition error.
    #[error("VF {vf} does not exist under /sys/class/net")]
    VfNotFound { vf: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to determine PCI address for network interface {vf}")]
    NoPciAddress { vf: String },
}

/// Resolves VF device names to PCI addresses by walking
/// `/sys/class/net/<vf>/device`.
///
/// The sysfs root is injectable so tests can run against a synthetic tree.
#[derive(Clone, Debug)]
pub struct SysfsResolver {
    root: PathBuf,
}

impl Default for SysfsResolver {
    fn default() -> Self {
        SysfsResolver {
            root: PathBuf::from("/sys/class/net"),
        }
    }
}

impl SysfsResolver {
    /// A resolver rooted somewhere other than `/sys/class/net`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        SysfsResolver { root: root.into() }
    }

    /// The kernel's name for VF `vf_index` of `parent`: `<parent>v<index>`.
    #[must_use]
    pub fn vf_name(parent: &InterfaceName, vf_index: u32) -> String {
        format!("{parent}v{vf_index}")
    }

    /// Resolve the PCI address of VF `vf_index` of `parent`.
    ///
    /// The device symlink is resolved and its path components scanned from
    /// the tail for a `[domain:]bus:device.function` segment; when that
    /// fails, `device/uevent` is parsed for `PCI_SLOT_NAME=`.
    ///
    /// # Errors
    ///
    /// [`SysfsError::VfNotFound`] when the VF netdev is absent,
    /// [`SysfsError::NoPciAddress`] when neither strategy yields an
    /// address.
    pub fn resolve_vf_pci(
        &self,
        parent: &InterfaceName,
        vf_index: u32,
    ) -> Result<PciAddress, SysfsError> {
        let vf = Self::vf_name(parent, vf_index);
        let iface_path = self.root.join(&vf);
        if !iface_path.exists() {
            return Err(SysfsError::VfNotFound { vf });
        }

        let device_path = iface_path.join("device");
        if let Ok(resolved) = fs::canonicalize(&device_path)
            && let Some(addr) = pci_from_path(&resolved)
        {
            debug!("VF {vf} PCI address {addr} (from device symlink)");
            return Ok(addr);
        }

        if let Some(addr) = pci_from_uevent(&device_path.join("uevent"))? {
            debug!("VF {vf} PCI address {addr} (from uevent)");
            return Ok(addr);
        }

        Err(SysfsError::NoPciAddress { vf })
    }
}

/// Scan path components from the tail for a PCI address.  Device paths
/// look like `/sys/devices/pci0000:00/0000:00:02.0/0000:01:00.1`.
fn pci_from_path(path: &Path) -> Option<PciAddress> {
    path.components().rev().find_map(|component| {
        let segment = component.as_os_str().to_str()?;
        if segment.contains(':') && segment.contains('.') {
            PciAddress::parse(segment).ok()
        } else {
            None
        }
    })
}

/// Parse `PCI_SLOT_NAME=dddd:bb:dd.f` out of a uevent file.
fn pci_from_uevent(path: &Path) -> Result<Option<PciAddress>, SysfsError> {
    let file = fs::File::open(path).map_err(|source| SysfsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| SysfsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(value) = line.strip_prefix("PCI_SLOT_NAME=") {
            return Ok(PciAddress::parse(value.trim()).ok());
        }
    }
    Ok(None)
}
