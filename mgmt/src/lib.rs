// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Workload management: the reconciler state machine, the TRex
//! port-configuration writer, and the HTTP control plane.

pub mod reconcile;
pub mod server;
pub mod trexcfg;

pub use reconcile::{HostNetwork, LinuxHostNetwork, ReconcileError, Reconciler};
pub use server::{router, serve};
pub use trexcfg::{CfgError, TrexCfgWriter, TrexPortConfig};
