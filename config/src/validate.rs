// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Manifest normalization and validation.

use crate::model::{NetworkType, TrexWorkload};
use trex_net::{IllegalInterfaceName, InterfaceName};

/// Bridge used when the manifest does not name one.
pub const DEFAULT_BRIDGE_NAME: &str = "trex-br0";

/// Errors which reject a submitted manifest.  These map to client errors
/// at the HTTP boundary; nothing on the host has been touched yet.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[must_use]
pub enum ValidationError {
    #[error("missing required field {0}")]
    Missing(&'static str),
    #[error("workload name '{0}' is not usable as a container name")]
    BadName(String),
    #[error("spec.mgmtIP '{0}' is not a valid IPv4 address or CIDR")]
    BadMgmtIp(String),
    #[error("spec.brName: {0}")]
    BadBridgeName(IllegalInterfaceName),
    #[error("spec.parentInterface: {0}")]
    BadParentInterface(IllegalInterfaceName),
}

/// Normalize a submitted workload in place and reject incomplete ones.
///
/// Applies the documented defaults (`networkType=SRIOV` is a serde
/// default; `brName=trex-br0` is applied here) and checks every field the
/// reconciler will later rely on.  Does not contact the host.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered.
pub fn validate(workload: &mut TrexWorkload) -> Result<(), ValidationError> {
    if workload.metadata.name.is_empty() {
        return Err(ValidationError::Missing("metadata.name"));
    }
    if !legal_workload_name(&workload.metadata.name) {
        return Err(ValidationError::BadName(workload.metadata.name.clone()));
    }
    if workload.metadata.image.is_empty() {
        return Err(ValidationError::Missing("metadata.image"));
    }
    if workload.spec.mgmt_ip.is_empty() {
        return Err(ValidationError::Missing("spec.mgmtIP"));
    }
    workload
        .mgmt_net()
        .map_err(ValidationError::BadMgmtIp)?;
    if workload.spec.mgmt_gateway.is_none() {
        return Err(ValidationError::Missing("spec.mgmtGateway"));
    }
    if workload.spec.port.is_empty() {
        return Err(ValidationError::Missing("spec.port"));
    }

    if workload.spec.bridge_name.is_empty() {
        workload.spec.bridge_name = DEFAULT_BRIDGE_NAME.to_string();
    }
    InterfaceName::new(workload.spec.bridge_name.clone())
        .map_err(ValidationError::BadBridgeName)?;

    if workload.spec.network_type == NetworkType::Sriov {
        let parent = workload
            .spec
            .parent_interface
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::Missing("spec.parentInterface"))?;
        InterfaceName::new(parent).map_err(ValidationError::BadParentInterface)?;
    }

    Ok(())
}

/// Container names must match `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; the same
/// charset keeps the derived veth name (`trex_` + first 9 bytes) legal.
fn legal_workload_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Metadata, Port, WorkloadSpec};
    use std::net::Ipv4Addr;

    fn workload() -> TrexWorkload {
        TrexWorkload {
            kind: "TrexConfig".to_string(),
            metadata: Metadata {
                name: "t1".to_string(),
                image: "trex:v3".to_string(),
            },
            spec: WorkloadSpec {
                mgmt_ip: "10.0.0.5/24".to_string(),
                mgmt_gateway: Some(Ipv4Addr::new(10, 0, 0, 1)),
                parent_interface: Some("eno1".to_string()),
                port: vec![Port {
                    vf_index: 0,
                    vlan_id: 100.try_into().unwrap(),
                    ..Port::default()
                }],
                ..WorkloadSpec::default()
            },
        }
    }

    #[test]
    fn accepts_and_defaults_bridge_name() {
        let mut w = workload();
        validate(&mut w).unwrap();
        assert_eq!(w.spec.bridge_name, DEFAULT_BRIDGE_NAME);
    }

    #[test]
    fn keeps_explicit_bridge_name() {
        let mut w = workload();
        w.spec.bridge_name = "br-lab".to_string();
        validate(&mut w).unwrap();
        assert_eq!(w.spec.bridge_name, "br-lab");
    }

    #[test]
    fn rejects_missing_fields() {
        let cases: &[(&str, fn(&mut TrexWorkload))] = &[
            ("metadata.name", |w| w.metadata.name.clear()),
            ("metadata.image", |w| w.metadata.image.clear()),
            ("spec.mgmtIP", |w| w.spec.mgmt_ip.clear()),
            ("spec.mgmtGateway", |w| w.spec.mgmt_gateway = None),
            ("spec.port", |w| w.spec.port.clear()),
            ("spec.parentInterface", |w| w.spec.parent_interface = None),
        ];
        for (field, mutate) in cases {
            let mut w = workload();
            mutate(&mut w);
            assert_eq!(
                validate(&mut w),
                Err(ValidationError::Missing(field)),
                "expected {field} to be required"
            );
        }
    }

    #[test]
    fn bridge_networking_does_not_require_parent() {
        let mut w = workload();
        w.spec.network_type = NetworkType::Bridge;
        w.spec.parent_interface = None;
        validate(&mut w).unwrap();
    }

    #[test]
    fn pads_bare_mgmt_ip_to_host_route() {
        let mut w = workload();
        w.spec.mgmt_ip = "10.0.0.5".to_string();
        validate(&mut w).unwrap();
        assert_eq!(w.mgmt_net().unwrap().to_string(), "10.0.0.5/32");
    }

    #[test]
    fn rejects_bad_mgmt_ip() {
        let mut w = workload();
        w.spec.mgmt_ip = "not-an-ip".to_string();
        assert!(matches!(
            validate(&mut w),
            Err(ValidationError::BadMgmtIp(_))
        ));
    }

    #[test]
    fn rejects_hostile_names() {
        for name in ["", "-leading-dash", "has space", "a/b", "ütf8"] {
            let mut w = workload();
            w.metadata.name = name.to_string();
            assert!(validate(&mut w).is_err(), "accepted name {name:?}");
        }
    }
}
