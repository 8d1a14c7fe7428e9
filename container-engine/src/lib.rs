// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Container lifecycle capability.
//!
//! The reconciler only ever sees the [`ContainerEngine`] trait; the docker
//! daemon lives behind [`DockerEngine`].  Tests substitute an in-memory
//! implementation.

mod docker;

pub use docker::DockerEngine;

use async_trait::async_trait;

/// Name of the pause container for a workload.
#[must_use]
pub fn pause_name(workload: &str) -> String {
    format!("{workload}-pause")
}

/// Mount target of the TRex port configuration inside the worker.
pub const WORKER_CFG_TARGET: &str = "/etc/trex_cfg.yaml";

/// Hugepage mount shared into the worker for DPDK.
pub const HUGEPAGE_MOUNT: &str = "/mnt/huge";

/// Errors which can occur while driving the container engine.
#[derive(Debug, thiserror::Error)]
#[must_use]
pub enum EngineError {
    #[error("docker api: {0}")]
    Api(#[from] bollard::errors::Error),
    #[error("container {id} is not running (status: {status})")]
    NotRunning { id: String, status: String },
    #[error("no live PID for container {id} after {attempts} attempts")]
    PidNotLive { id: String, attempts: u32 },
}

/// Container lifecycle operations the reconciler depends on.
///
/// Container IDs are owned by the engine; callers hold them by value.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Make sure `image` is locally present, pulling it if necessary.
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create the network-holder pause container (`NetworkMode=none`).
    /// Returns the container ID.
    async fn create_pause(&self, workload: &str, image: &str) -> Result<String, EngineError>;

    /// Create the TRex worker sharing the pause container's network
    /// namespace, privileged, with the hugepage and port-config mounts.
    /// Returns the container ID.
    async fn create_worker(
        &self,
        workload: &str,
        image: &str,
        pause_id: &str,
        cfg_path: &str,
    ) -> Result<String, EngineError>;

    async fn start(&self, id: &str) -> Result<(), EngineError>;

    async fn stop(&self, id: &str) -> Result<(), EngineError>;

    /// Force-remove a container.  Used by delete and by compensation.
    async fn remove(&self, id: &str) -> Result<(), EngineError>;

    /// `(id, name)` pairs for all containers, running or not.  Names are
    /// reported the way the engine spells them: with a leading `/`.
    async fn list_names(&self) -> Result<Vec<(String, String)>, EngineError>;

    /// Wait for the container to be running with a PID that is alive on
    /// the host.  Polls a few times to ride out engine startup lag.
    async fn valid_pid(&self, id: &str) -> Result<i32, EngineError>;
}
