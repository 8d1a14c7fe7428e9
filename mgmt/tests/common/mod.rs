// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! In-memory host capabilities for reconciler and HTTP tests.
//!
//! The fakes model exactly the state the controller mutates: containers
//! by name, the bridge, host veths, the parent NIC's VF VLAN table, and
//! the management interface inside the pause netns.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing::warn;
use trex_config::TrexWorkload;
use trex_container_engine::{ContainerEngine, EngineError, pause_name};
use trex_interface_manager::{
    BridgeHandle, NetlinkError, PlumbError, PlumbRequest, SysfsError, veth_names,
};
use trex_mgmt::reconcile::{HostNetwork, Reconciler};
use trex_mgmt::trexcfg::TrexCfgWriter;
use trex_net::{InterfaceName, PciAddress};

#[derive(Clone, Debug)]
pub struct FakeContainer {
    pub name: String,
    pub running: bool,
    pub image: String,
    pub network_mode: Option<String>,
    pub cfg_path: Option<String>,
}

#[derive(Default)]
pub struct EngineState {
    pub containers: HashMap<String, FakeContainer>,
    pub images: BTreeSet<String>,
    pub next_id: u64,
    pub fail_worker_create: bool,
    pub fail_pause_pid: bool,
}

#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn container_by_name(&self, name: &str) -> Option<FakeContainer> {
        let state = self.state.lock().unwrap();
        state
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().images.insert(image.to_string());
        Ok(())
    }

    async fn create_pause(&self, workload: &str, image: &str) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("pause-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: pause_name(workload),
                running: false,
                image: image.to_string(),
                network_mode: Some("none".to_string()),
                cfg_path: None,
            },
        );
        Ok(id)
    }

    async fn create_worker(
        &self,
        workload: &str,
        image: &str,
        pause_id: &str,
        cfg_path: &str,
    ) -> Result<String, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_worker_create {
            return Err(EngineError::NotRunning {
                id: workload.to_string(),
                status: "injected failure".to_string(),
            });
        }
        state.next_id += 1;
        let id = format!("worker-{}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: workload.to_string(),
                running: false,
                image: image.to_string(),
                network_mode: Some(format!("container:{pause_id}")),
                cfg_path: Some(cfg_path.to_string()),
            },
        );
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(EngineError::NotRunning {
                id: id.to_string(),
                status: "absent".to_string(),
            }),
        }
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        if let Some(container) = self.state.lock().unwrap().containers.get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().containers.remove(id);
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<(String, String)>, EngineError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|(id, c)| (id.clone(), format!("/{}", c.name)))
            .collect())
    }

    async fn valid_pid(&self, id: &str) -> Result<i32, EngineError> {
        let state = self.state.lock().unwrap();
        if state.fail_pause_pid {
            return Err(EngineError::PidNotLive {
                id: id.to_string(),
                attempts: 5,
            });
        }
        Ok(4242)
    }
}

#[derive(Default)]
pub struct NetState {
    pub bridges: BTreeSet<String>,
    pub veths: BTreeSet<String>,
    pub vf_vlans: BTreeMap<(String, u32), u16>,
    pub mgmt_addr: Option<String>,
    pub default_route: Option<Ipv4Addr>,
    pub bridge_squatted: bool,
    pub missing_vfs: BTreeSet<u32>,
    /// Simulate ENETUNREACH on the default-route install: the address
    /// still lands on `mgmt`, the route does not, and plumbing succeeds.
    pub force_enetunreach: bool,
}

#[derive(Default)]
pub struct FakeNetwork {
    pub state: Mutex<NetState>,
}

#[async_trait]
impl HostNetwork for FakeNetwork {
    async fn ensure_bridge(&self, name: &InterfaceName) -> Result<BridgeHandle, NetlinkError> {
        let mut state = self.state.lock().unwrap();
        if state.bridge_squatted {
            return Err(NetlinkError::NotABridge {
                name: name.to_string(),
            });
        }
        state.bridges.insert(name.to_string());
        Ok(BridgeHandle {
            name: name.clone(),
            index: 7,
        })
    }

    async fn plumb(
        &self,
        request: &PlumbRequest,
    ) -> Result<BTreeMap<String, PciAddress>, PlumbError> {
        let mut state = self.state.lock().unwrap();
        let mut vf_pci = BTreeMap::new();
        if let Some(parent) = &request.parent {
            for port in &request.vf_ports {
                if state.missing_vfs.contains(&port.vf_index) {
                    return Err(PlumbError::Sysfs(SysfsError::VfNotFound {
                        vf: format!("{parent}v{}", port.vf_index),
                    }));
                }
                let pci =
                    PciAddress::parse(&format!("0000:{:02x}:00.1", 0x10 + port.vf_index)).unwrap();
                vf_pci.insert(format!("{parent}v{}", port.vf_index), pci);
                state
                    .vf_vlans
                    .insert((parent.to_string(), port.vf_index), port.vlan.to_u16());
            }
        }
        state.veths.insert(veth_names(&request.workload).0);
        state.mgmt_addr = Some(request.mgmt_addr.to_string());
        if state.force_enetunreach {
            warn!(
                "network unreachable when adding default route via {}, continuing",
                request.mgmt_gateway
            );
        } else {
            state.default_route = Some(request.mgmt_gateway);
        }
        Ok(vf_pci)
    }

    async fn delete_host_veth(&self, workload: &str) -> Result<(), NetlinkError> {
        self.state
            .lock()
            .unwrap()
            .veths
            .remove(&veth_names(workload).0);
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub network: Arc<FakeNetwork>,
    pub reconciler: Arc<Reconciler>,
    pub cfg_dir: TempDir,
}

#[must_use]
pub fn harness() -> Harness {
    let engine = Arc::new(FakeEngine::default());
    let network = Arc::new(FakeNetwork::default());
    let cfg_dir = TempDir::new().unwrap();
    let reconciler = Arc::new(Reconciler::new(
        engine.clone(),
        network.clone(),
        TrexCfgWriter::with_base_dir(cfg_dir.path()),
        "registry.k8s.io/pause:3.8".to_string(),
    ));
    Harness {
        engine,
        network,
        reconciler,
        cfg_dir,
    }
}

#[must_use]
pub fn minimal_sriov_spec(name: &str) -> TrexWorkload {
    serde_yaml_ng::from_str(&minimal_sriov_manifest(name)).unwrap()
}

#[must_use]
pub fn minimal_sriov_manifest(name: &str) -> String {
    format!(
        r#"
kind: TrexConfig
metadata:
  name: {name}
  image: trex:v3
spec:
  mgmtIP: 10.0.0.5/24
  mgmtGateway: 10.0.0.1
  parentInterface: eno1
  port:
    - vfIndex: 0
      vlanId: 100
"#
    )
}
