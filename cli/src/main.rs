// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! `trexctl`: thin client for the TRex controller.
//!
//! Reads a manifest file, infers the Content-Type from its extension, and
//! POSTs it to the controller.  Exits 1 on any non-2xx response.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

const DEFAULT_CONTROLLER_URL: &str = "http://localhost:21111";

#[derive(Parser)]
#[command(name = "trexctl", about = "TRex Controller CLI", long_about = None)]
struct Cli {
    #[arg(
        long,
        value_name = "URL",
        default_value = DEFAULT_CONTROLLER_URL,
        help = "Controller address"
    )]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply configuration from file
    Apply {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Update configuration from file
    Update {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Delete configuration from file
    Delete {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },
}

impl Command {
    fn endpoint(&self) -> &'static str {
        match self {
            Command::Apply { .. } => "apply",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
        }
    }

    fn file(&self) -> &Path {
        match self {
            Command::Apply { file } | Command::Update { file } | Command::Delete { file } => file,
        }
    }
}

/// Content-Type by file extension; anything unrecognized is sent as plain
/// text and left for the controller to interpret.
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => "application/yaml",
        Some("json") => "application/json",
        _ => "text/plain",
    }
}

async fn send_to_controller(server: &str, command: &Command) -> anyhow::Result<()> {
    let path = command.file();
    let body = std::fs::read(path)
        .with_context(|| format!("error reading file {}", path.display()))?;

    let url = format!("{server}/{}", command.endpoint());
    let response = reqwest::Client::new()
        .post(&url)
        .header("Content-Type", content_type_for(path))
        .body(body)
        .send()
        .await
        .with_context(|| format!("error sending request to {url}"))?;

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("{text}");
    }
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = send_to_controller(&cli.server, &cli.command).await {
        eprintln!("{} failed: {err:#}", cli.command.endpoint());
        std::process::exit(1);
    }
}
