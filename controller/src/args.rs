// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Command line of the controller daemon.

use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_LOG_PATH: &str = "/var/log/trex-controller.log";
pub const DEFAULT_PAUSE_IMAGE: &str = "registry.k8s.io/pause:3.8";

#[derive(Parser, Debug)]
#[command(name = "trex-controller", about = "TRex workload controller", long_about = None)]
pub struct CmdArgs {
    #[arg(
        long = "log",
        value_name = "PATH",
        default_value = DEFAULT_LOG_PATH,
        help = "Path to log file"
    )]
    pub log: PathBuf,

    #[arg(
        long = "level",
        value_name = "LEVEL",
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub level: String,

    #[arg(
        long = "port",
        value_name = "PORT",
        default_value_t = 21111,
        help = "Port to listen on"
    )]
    pub port: u16,

    #[arg(
        long = "pause-image",
        value_name = "IMAGE",
        default_value = DEFAULT_PAUSE_IMAGE,
        help = "Pause container image (override for offline registries)"
    )]
    pub pause_image: String,
}
