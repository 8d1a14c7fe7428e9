// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! The workload reconciler.
//!
//! Serialized apply/update/delete with compensating cleanup.  This is the
//! only place that recovers from partial failure: everything below it
//! simply reports what went wrong, and everything it created before the
//! failing step is unwound here in reverse order.

use crate::trexcfg::{CfgError, TrexCfgWriter, build_port_config};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use trex_config::{NetworkType, TrexWorkload, ValidationError, validate};
use trex_container_engine::{ContainerEngine, EngineError, pause_name};
use trex_interface_manager::{
    BridgeHandle, BridgeManager, NetlinkError, NetworkPlumber, PlumbError, PlumbRequest, VfPort,
    name9,
};
use trex_net::{InterfaceName, PciAddress};

/// Host-network capability the reconciler drives.  The Linux
/// implementation is [`LinuxHostNetwork`]; tests inject fakes.
#[async_trait]
pub trait HostNetwork: Send + Sync {
    async fn ensure_bridge(&self, name: &InterfaceName) -> Result<BridgeHandle, NetlinkError>;

    async fn plumb(
        &self,
        request: &PlumbRequest,
    ) -> Result<BTreeMap<String, PciAddress>, PlumbError>;

    /// Delete the deterministic host veth of `workload`.  Absence is
    /// success.
    async fn delete_host_veth(&self, workload: &str) -> Result<(), NetlinkError>;
}

/// [`HostNetwork`] over the real kernel.
pub struct LinuxHostNetwork {
    bridges: BridgeManager,
    plumber: NetworkPlumber,
}

impl LinuxHostNetwork {
    #[must_use]
    pub fn new(bridges: BridgeManager, plumber: NetworkPlumber) -> Self {
        LinuxHostNetwork { bridges, plumber }
    }
}

#[async_trait]
impl HostNetwork for LinuxHostNetwork {
    async fn ensure_bridge(&self, name: &InterfaceName) -> Result<BridgeHandle, NetlinkError> {
        self.bridges.ensure(name).await
    }

    async fn plumb(
        &self,
        request: &PlumbRequest,
    ) -> Result<BTreeMap<String, PciAddress>, PlumbError> {
        self.plumber.plumb(request).await
    }

    async fn delete_host_veth(&self, workload: &str) -> Result<(), NetlinkError> {
        self.plumber.teardown(workload).await
    }
}

/// Errors which can terminate a reconcile operation.  Each variant names
/// the step that failed; the inner error carries the host-level cause.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("container with name {0} already exists")]
    AlreadyExists(String),
    #[error(
        "workload {name} shares the veth name prefix '{prefix}' with live workload {existing}"
    )]
    VethPrefixCollision {
        name: String,
        prefix: String,
        existing: String,
    },
    #[error("failed to list containers: {0}")]
    List(#[source] EngineError),
    #[error("failed to ensure image exists: {0}")]
    Image(#[source] EngineError),
    #[error("failed to ensure bridge: {0}")]
    Bridge(#[source] NetlinkError),
    #[error("failed to create pause container: {0}")]
    Pause(#[source] EngineError),
    #[error("failed to configure pause container network: {0}")]
    Network(#[source] PlumbError),
    #[error("failed to create TRex port configuration: {0}")]
    Cfg(#[source] CfgError),
    #[error("failed to create worker container: {0}")]
    Worker(#[source] EngineError),
    #[error("failed to delete container {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: EngineError,
    },
}

impl ReconcileError {
    /// Whether the caller is at fault (maps to a 4xx at the HTTP layer).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, ReconcileError::Validation(_))
    }
}

/// Completed deployment steps, consulted by the compensating path.
#[derive(Debug, Default)]
struct DeployProgress {
    pause_id: Option<String>,
    network_configured: bool,
    worker_id: Option<String>,
}

/// The reconciler: owns the process-wide single-writer lock and the
/// injected host capabilities.
pub struct Reconciler {
    engine: Arc<dyn ContainerEngine>,
    network: Arc<dyn HostNetwork>,
    cfg_writer: TrexCfgWriter,
    pause_image: String,
    // apply/update/delete are exclusive on the host: netlink and sysfs
    // mutations on a shared NIC and bridge do not interleave safely
    lock: Mutex<()>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        network: Arc<dyn HostNetwork>,
        cfg_writer: TrexCfgWriter,
        pause_image: String,
    ) -> Self {
        Reconciler {
            engine,
            network,
            cfg_writer,
            pause_image,
            lock: Mutex::new(()),
        }
    }

    /// Create a workload.  Validates, refuses name collisions, executes
    /// the deployment sequence, and compensates on any failure.
    ///
    /// # Errors
    ///
    /// Returns the root cause of the first failing step; by then every
    /// partial side effect has been unwound.
    pub async fn apply(&self, mut workload: TrexWorkload) -> Result<String, ReconcileError> {
        validate(&mut workload)?;
        let _guard = self.lock.lock().await;
        self.apply_locked(&workload).await
    }

    /// Replace a workload: delete it, then apply the new manifest, under
    /// one lock hold.  There is no rollback of the delete if the apply
    /// fails; the error says which phase failed.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::apply`] and [`Reconciler::delete`].
    pub async fn update(&self, mut workload: TrexWorkload) -> Result<String, ReconcileError> {
        validate(&mut workload)?;
        let _guard = self.lock.lock().await;
        let deleted = self.delete_locked(&workload.metadata.name).await?;
        info!("update: {deleted}");
        self.apply_locked(&workload).await
    }

    /// Delete a workload by name.  Missing containers are a benign
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when a container that does exist cannot be
    /// removed, or the engine cannot be queried.
    pub async fn delete(&self, name: &str) -> Result<String, ReconcileError> {
        if name.is_empty() {
            return Err(ValidationError::Missing("metadata.name").into());
        }
        let _guard = self.lock.lock().await;
        self.delete_locked(name).await
    }

    async fn apply_locked(&self, workload: &TrexWorkload) -> Result<String, ReconcileError> {
        let name = &workload.metadata.name;
        info!("creating workload {name}");

        self.check_name_free(name).await?;

        let mut progress = DeployProgress::default();
        match self.deploy(workload, &mut progress).await {
            Ok(worker_id) => Ok(format!(
                "Container {name} created and started with ID: {worker_id}"
            )),
            Err(err) => {
                error!("deployment of {name} failed: {err}");
                self.compensate(name, &progress).await;
                Err(err)
            }
        }
    }

    /// Refuse names that collide with live containers, either exactly or
    /// by the 9-byte veth prefix.
    async fn check_name_free(&self, name: &str) -> Result<(), ReconcileError> {
        let worker = format!("/{name}");
        let pause = format!("/{}", pause_name(name));
        let containers = self.engine.list_names().await.map_err(ReconcileError::List)?;
        for (_, existing) in &containers {
            if *existing == worker || *existing == pause {
                return Err(ReconcileError::AlreadyExists(name.to_string()));
            }
            // a live pause container marks a live workload; identical
            // 9-byte prefixes would produce the same host veth name
            if let Some(other) = existing
                .strip_prefix('/')
                .and_then(|n| n.strip_suffix("-pause"))
                && other != name
                && name9(other) == name9(name)
            {
                return Err(ReconcileError::VethPrefixCollision {
                    name: name.to_string(),
                    prefix: name9(name).to_string(),
                    existing: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// The six-step deployment.  Progress is recorded as steps complete so
    /// the compensating path knows what exists.
    async fn deploy(
        &self,
        workload: &TrexWorkload,
        progress: &mut DeployProgress,
    ) -> Result<String, ReconcileError> {
        let name = &workload.metadata.name;

        // 1. images
        self.engine
            .ensure_image(&self.pause_image)
            .await
            .map_err(ReconcileError::Image)?;
        self.engine
            .ensure_image(&workload.metadata.image)
            .await
            .map_err(ReconcileError::Image)?;

        // 2. bridge (shared; never owned by one workload)
        let bridge_name = InterfaceName::new(workload.spec.bridge_name.clone())
            .map_err(ValidationError::BadBridgeName)
            .map_err(ReconcileError::Validation)?;
        let bridge = self
            .network
            .ensure_bridge(&bridge_name)
            .await
            .map_err(ReconcileError::Bridge)?;

        // 3. pause container, started, with a live PID
        let pause_id = self
            .engine
            .create_pause(name, &self.pause_image)
            .await
            .map_err(ReconcileError::Pause)?;
        progress.pause_id = Some(pause_id.clone());
        self.engine
            .start(&pause_id)
            .await
            .map_err(ReconcileError::Pause)?;
        let pause_pid = self
            .engine
            .valid_pid(&pause_id)
            .await
            .map_err(ReconcileError::Pause)?;

        // 4. network plumbing
        let request = self.plumb_request(workload, pause_pid, bridge)?;
        let vf_pci = self
            .network
            .plumb(&request)
            .await
            .map_err(ReconcileError::Network)?;
        progress.network_configured = true;

        // 5. TRex port configuration
        let mut rng = SmallRng::from_rng(&mut rand::rng());
        let cfg =
            build_port_config(workload, &vf_pci, &mut rng).map_err(ReconcileError::Cfg)?;
        let cfg_path = self
            .cfg_writer
            .write(name, &cfg)
            .map_err(ReconcileError::Cfg)?;

        // 6. worker container sharing the pause netns
        let worker_id = self
            .engine
            .create_worker(
                name,
                &workload.metadata.image,
                &pause_id,
                &cfg_path.to_string_lossy(),
            )
            .await
            .map_err(ReconcileError::Worker)?;
        progress.worker_id = Some(worker_id.clone());
        self.engine
            .start(&worker_id)
            .await
            .map_err(ReconcileError::Worker)?;

        info!("workload {name} deployed (worker {worker_id})");
        Ok(worker_id)
    }

    fn plumb_request(
        &self,
        workload: &TrexWorkload,
        pause_pid: i32,
        bridge: BridgeHandle,
    ) -> Result<PlumbRequest, ReconcileError> {
        let mgmt_addr = workload
            .mgmt_net()
            .map_err(ValidationError::BadMgmtIp)
            .map_err(ReconcileError::Validation)?;
        let mgmt_gateway = workload
            .spec
            .mgmt_gateway
            .ok_or(ValidationError::Missing("spec.mgmtGateway"))
            .map_err(ReconcileError::Validation)?;

        let (parent, vf_ports) = if workload.spec.network_type == NetworkType::Sriov {
            let parent = workload
                .spec
                .parent_interface
                .as_deref()
                .ok_or(ValidationError::Missing("spec.parentInterface"))
                .map_err(ReconcileError::Validation)?;
            let parent = InterfaceName::new(parent)
                .map_err(ValidationError::BadParentInterface)
                .map_err(ReconcileError::Validation)?;
            let ports = workload
                .spec
                .port
                .iter()
                .map(|port| VfPort {
                    vf_index: port.vf_index,
                    vlan: port.vlan_id,
                })
                .collect();
            (Some(parent), ports)
        } else {
            (None, Vec::new())
        };

        Ok(PlumbRequest {
            workload: workload.metadata.name.clone(),
            pause_pid,
            bridge,
            mgmt_addr,
            mgmt_gateway,
            parent,
            vf_ports,
        })
    }

    /// Unwind a failed deployment in reverse order of what was created.
    /// The bridge stays: it may carry other workloads.  Compensation
    /// failures are logged, never surfaced over the root cause.
    async fn compensate(&self, name: &str, progress: &DeployProgress) {
        warn!("compensating failed deployment of {name}");
        if let Some(worker_id) = &progress.worker_id
            && let Err(err) = self.engine.remove(worker_id).await
        {
            error!("compensation: failed to remove worker container {worker_id}: {err}");
        }
        if progress.network_configured
            && let Err(err) = self.network.delete_host_veth(name).await
        {
            error!("compensation: failed to delete host veth for {name}: {err}");
        }
        if let Some(pause_id) = &progress.pause_id
            && let Err(err) = self.engine.remove(pause_id).await
        {
            error!("compensation: failed to remove pause container {pause_id}: {err}");
        }
    }

    async fn delete_locked(&self, name: &str) -> Result<String, ReconcileError> {
        info!("deleting workload {name}");
        let worker = format!("/{name}");
        let pause = format!("/{}", pause_name(name));
        let containers = self.engine.list_names().await.map_err(ReconcileError::List)?;

        let worker_id = containers
            .iter()
            .find(|(_, n)| *n == worker)
            .map(|(id, _)| id.clone());
        let pause_id = containers
            .iter()
            .find(|(_, n)| *n == pause)
            .map(|(id, _)| id.clone());

        let Some(worker_id) = worker_id else {
            return Ok(format!("Container {name} not exist"));
        };
        let Some(pause_id) = pause_id else {
            return Ok(format!("Container {} not exist", pause_name(name)));
        };

        if let Err(err) = self.engine.stop(&worker_id).await {
            warn!("failed to stop container {name}: {err}");
        }
        self.engine
            .remove(&worker_id)
            .await
            .map_err(|source| ReconcileError::Delete {
                name: name.to_string(),
                source,
            })?;
        self.engine
            .remove(&pause_id)
            .await
            .map_err(|source| ReconcileError::Delete {
                name: pause_name(name),
                source,
            })?;

        // VF VLANs on the parent NIC are intentionally left in place
        if let Err(err) = self.network.delete_host_veth(name).await {
            warn!("failed to delete veth pair for {name}: {err}");
        }

        Ok(format!("Container {name} deleted"))
    }
}
