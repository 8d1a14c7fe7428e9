// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! The TRex controller daemon: parse flags, initialize logging, wire the
//! host capabilities together, and serve the control plane until
//! shutdown.

mod args;

use crate::args::CmdArgs;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trex_container_engine::DockerEngine;
use trex_interface_manager::{BridgeManager, NetlinkOps, NetworkPlumber};
use trex_mgmt::{LinuxHostNetwork, Reconciler, TrexCfgWriter, serve};

fn init_logging(args: &CmdArgs) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = args.log.parent().unwrap_or(std::path::Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let file_name = args
        .log
        .file_name()
        .context("--log must name a file, not a directory")?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CmdArgs::parse();
    let _log_guard = init_logging(&args)?;
    info!(
        "starting TRex controller (version {}, log {}, port {})",
        env!("CARGO_PKG_VERSION"),
        args.log.display(),
        args.port
    );

    let engine = Arc::new(DockerEngine::connect().context("failed to connect to docker")?);
    let ops = NetlinkOps::new().context("failed to open netlink")?;
    let network = Arc::new(LinuxHostNetwork::new(
        BridgeManager::new(ops.clone()),
        NetworkPlumber::new(ops),
    ));
    let reconciler = Arc::new(Reconciler::new(
        engine,
        network,
        TrexCfgWriter::default(),
        args.pause_image.clone(),
    ));

    serve(args.port, reconciler)
        .await
        .context("control plane server failed")?;
    Ok(())
}
