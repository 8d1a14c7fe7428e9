// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! [`ContainerEngine`] implementation over the docker daemon.

use crate::{ContainerEngine, EngineError, HUGEPAGE_MOUNT, WORKER_CFG_TARGET, pause_name};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, HostConfig, Mount, MountTypeEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::TryStreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const PID_WAIT_ATTEMPTS: u32 = 5;
const PID_WAIT_DELAY: Duration = Duration::from_millis(500);

/// The docker-backed engine.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local docker daemon with default settings
    /// (`DOCKER_HOST` / unix socket).
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(DockerEngine { docker })
    }

    fn is_not_found(err: &bollard::errors::Error) -> bool {
        matches!(
            err,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }
        )
    }
}

fn bind_mount(source: &str, target: &str) -> Mount {
    Mount {
        source: Some(source.to_string()),
        target: Some(target.to_string()),
        typ: Some(MountTypeEnum::BIND),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ensure_image(&self, image: &str) -> Result<(), EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!("image {image} already present");
                return Ok(());
            }
            Err(err) if Self::is_not_found(&err) => {}
            Err(err) => return Err(err.into()),
        }

        info!("pulling image {image}");
        let mut pull = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: Some(image.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.try_next().await? {
            if let Some(status) = progress.status {
                info!(
                    "pulling {image}: {} {status}",
                    progress.id.unwrap_or_default()
                );
            }
        }
        info!("pulled image {image}");
        Ok(())
    }

    async fn create_pause(&self, workload: &str, image: &str) -> Result<String, EngineError> {
        let name = pause_name(workload);
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(name.clone()),
                    ..Default::default()
                }),
                ContainerCreateBody {
                    image: Some(image.to_string()),
                    host_config: Some(HostConfig {
                        network_mode: Some("none".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await?;
        debug!("pause container {name} created with id {}", response.id);
        Ok(response.id)
    }

    async fn create_worker(
        &self,
        workload: &str,
        image: &str,
        pause_id: &str,
        cfg_path: &str,
    ) -> Result<String, EngineError> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(workload.to_string()),
                    ..Default::default()
                }),
                ContainerCreateBody {
                    image: Some(image.to_string()),
                    // keep the container alive; TRex is started by the operator
                    cmd: Some(vec![
                        "tail".to_string(),
                        "-f".to_string(),
                        "/dev/null".to_string(),
                    ]),
                    tty: Some(true),
                    host_config: Some(HostConfig {
                        network_mode: Some(format!("container:{pause_id}")),
                        privileged: Some(true),
                        cap_add: Some(vec!["ALL".to_string()]),
                        mounts: Some(vec![
                            bind_mount(HUGEPAGE_MOUNT, HUGEPAGE_MOUNT),
                            bind_mount(cfg_path, WORKER_CFG_TARGET),
                        ]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await?;
        debug!("worker container {workload} created with id {}", response.id);
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<(String, String)>, EngineError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                ..Default::default()
            }))
            .await?;
        let mut names = Vec::new();
        for container in containers {
            let id = container.id.unwrap_or_default();
            for name in container.names.unwrap_or_default() {
                names.push((id.clone(), name));
            }
        }
        Ok(names)
    }

    async fn valid_pid(&self, id: &str) -> Result<i32, EngineError> {
        for attempt in 1..=PID_WAIT_ATTEMPTS {
            let inspect = self
                .docker
                .inspect_container(id, None::<InspectContainerOptions>)
                .await?;
            let state = inspect.state.unwrap_or_default();
            if state.status != Some(ContainerStateStatusEnum::RUNNING) {
                return Err(EngineError::NotRunning {
                    id: id.to_string(),
                    status: format!("{:?}", state.status),
                });
            }
            if let Some(pid) = state.pid
                && pid > 0
            {
                if Path::new(&format!("/proc/{pid}")).exists() {
                    return Ok(pid as i32);
                }
                warn!("container {id} PID {pid} not alive yet, retrying");
            }
            if attempt < PID_WAIT_ATTEMPTS {
                tokio::time::sleep(PID_WAIT_DELAY).await;
            }
        }
        Err(EngineError::PidNotLive {
            id: id.to_string(),
            attempts: PID_WAIT_ATTEMPTS,
        })
    }
}
