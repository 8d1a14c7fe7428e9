// SPDX-License-Identifier: Apache-2.0
// Copyright TRex Controller Authors

//! Reconciler state-machine tests against in-memory host capabilities.

mod common;

use common::{harness, minimal_sriov_spec};
use std::net::Ipv4Addr;
use tracing_test::traced_test;
use trex_mgmt::reconcile::ReconcileError;
use trex_mgmt::trexcfg::TrexPortConfig;

#[tokio::test]
async fn minimal_sriov_apply() {
    let h = harness();
    let status = h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();
    assert!(
        status.starts_with("Container t1 created and started with ID:"),
        "unexpected status line: {status}"
    );

    // both containers exist and run
    let pause = h.engine.container_by_name("t1-pause").unwrap();
    let worker = h.engine.container_by_name("t1").unwrap();
    assert!(pause.running && worker.running);
    assert_eq!(pause.network_mode.as_deref(), Some("none"));

    // the worker shares the pause netns and mounts the generated cfg
    let mode = worker.network_mode.unwrap();
    assert!(mode.starts_with("container:pause-"), "mode was {mode}");
    let cfg_path = worker.cfg_path.unwrap();
    assert!(cfg_path.ends_with("t1_trex_cfg.yaml"));

    // host side: bridge, veth, VF VLAN, mgmt address
    let net = h.network.state.lock().unwrap();
    assert!(net.bridges.contains("trex-br0"));
    assert!(net.veths.contains("trex_t1"));
    assert_eq!(net.vf_vlans.get(&("eno1".to_string(), 0)), Some(&100));
    assert_eq!(net.mgmt_addr.as_deref(), Some("10.0.0.5/24"));
    assert_eq!(net.default_route, Some(Ipv4Addr::new(10, 0, 0, 1)));
    drop(net);

    // generated cfg pairs the resolved PCI with a dummy slot
    let raw = std::fs::read_to_string(h.cfg_dir.path().join("t1_trex_cfg.yaml")).unwrap();
    let parsed: Vec<TrexPortConfig> = serde_yaml_ng::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 1);
    let cfg = &parsed[0];
    assert_eq!(cfg.port_limit, 2);
    assert_eq!(cfg.interfaces, vec!["0000:10:00.1", "dummy"]);
    assert_eq!(cfg.port_info.len(), 2);
}

#[tokio::test]
async fn apply_twice_is_a_name_collision() {
    let h = harness();
    h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();
    let before = h.engine.container_count();

    let err = h
        .reconciler
        .apply(minimal_sriov_spec("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::AlreadyExists(ref n) if n == "t1"));
    assert_eq!(err.to_string(), "container with name t1 already exists");

    // host state unchanged
    assert_eq!(h.engine.container_count(), before);
    assert!(h.engine.container_by_name("t1").unwrap().running);
    let net = h.network.state.lock().unwrap();
    assert!(net.veths.contains("trex_t1"));
}

#[tokio::test]
#[traced_test]
async fn missing_vf_fails_and_compensates() {
    let h = harness();
    h.network.state.lock().unwrap().missing_vfs.insert(7);

    let mut spec = minimal_sriov_spec("t1");
    spec.spec.port[0].vf_index = 7;
    let err = h.reconciler.apply(spec).await.unwrap_err();
    assert!(
        err.to_string().contains("eno1v7"),
        "error does not name the VF: {err}"
    );

    // compensation: no containers, no veth, bridge retained
    assert_eq!(h.engine.container_count(), 0);
    let net = h.network.state.lock().unwrap();
    assert!(net.veths.is_empty());
    assert!(net.bridges.contains("trex-br0"));
    drop(net);
    assert!(logs_contain("compensating failed deployment of t1"));
}

#[tokio::test]
async fn worker_failure_unwinds_everything_but_the_bridge() {
    let h = harness();
    h.engine.state.lock().unwrap().fail_worker_create = true;

    let err = h
        .reconciler
        .apply(minimal_sriov_spec("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Worker(_)));

    assert_eq!(h.engine.container_count(), 0);
    let net = h.network.state.lock().unwrap();
    assert!(net.veths.is_empty());
    assert!(net.bridges.contains("trex-br0"));
}

#[tokio::test]
async fn pause_pid_failure_removes_the_pause_container() {
    let h = harness();
    h.engine.state.lock().unwrap().fail_pause_pid = true;

    let err = h
        .reconciler
        .apply(minimal_sriov_spec("t1"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Pause(_)));
    assert_eq!(h.engine.container_count(), 0);
    assert!(h.network.state.lock().unwrap().veths.is_empty());
}

#[tokio::test]
async fn delete_after_apply_restores_pre_apply_state() {
    let h = harness();
    h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();

    let status = h.reconciler.delete("t1").await.unwrap();
    assert_eq!(status, "Container t1 deleted");

    assert_eq!(h.engine.container_count(), 0);
    let net = h.network.state.lock().unwrap();
    assert!(net.veths.is_empty());
    // the bridge may be shared and survives delete
    assert!(net.bridges.contains("trex-br0"));
}

#[tokio::test]
async fn delete_of_missing_workload_is_benign() {
    let h = harness();
    let status = h.reconciler.delete("ghost").await.unwrap();
    assert_eq!(status, "Container ghost not exist");
    assert_eq!(h.engine.container_count(), 0);
}

#[tokio::test]
async fn bridge_name_squatting_is_fatal_with_no_side_effects() {
    let h = harness();
    h.network.state.lock().unwrap().bridge_squatted = true;

    let err = h
        .reconciler
        .apply(minimal_sriov_spec("t1"))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("already exists but is not a bridge"),
        "unexpected error: {err}"
    );
    assert_eq!(h.engine.container_count(), 0);
    assert!(h.network.state.lock().unwrap().veths.is_empty());
}

#[tokio::test]
#[traced_test]
async fn unreachable_gateway_degrades_to_a_warning() {
    let h = harness();
    h.network.state.lock().unwrap().force_enetunreach = true;

    let status = h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();
    assert!(
        status.starts_with("Container t1 created and started with ID:"),
        "unexpected status line: {status}"
    );

    // the workload is up and mgmt has its address, just no default route
    assert!(h.engine.container_by_name("t1").unwrap().running);
    let net = h.network.state.lock().unwrap();
    assert_eq!(net.mgmt_addr.as_deref(), Some("10.0.0.5/24"));
    assert_eq!(net.default_route, None);
    drop(net);
    assert!(logs_contain(
        "network unreachable when adding default route"
    ));
}

#[tokio::test]
async fn update_replaces_the_workload() {
    let h = harness();
    h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();

    let mut updated = minimal_sriov_spec("t1");
    updated.metadata.image = "trex:v4".to_string();
    let status = h.reconciler.update(updated).await.unwrap();
    assert!(status.starts_with("Container t1 created and started with ID:"));

    let worker = h.engine.container_by_name("t1").unwrap();
    assert_eq!(worker.image, "trex:v4");
    // still exactly one pause and one worker
    assert_eq!(h.engine.container_count(), 2);
}

#[tokio::test]
async fn failed_update_leaves_the_workload_absent() {
    let h = harness();
    h.reconciler.apply(minimal_sriov_spec("t1")).await.unwrap();

    // the delete half will succeed, then the apply half dies at the
    // worker step; update does not roll the delete back
    h.engine.state.lock().unwrap().fail_worker_create = true;
    let mut updated = minimal_sriov_spec("t1");
    updated.metadata.image = "trex:v4".to_string();
    let err = h.reconciler.update(updated).await.unwrap_err();
    assert!(
        matches!(err, ReconcileError::Worker(_)),
        "error does not name the failing phase: {err}"
    );

    // old containers gone, new ones compensated away, no veth residue
    assert_eq!(h.engine.container_count(), 0);
    assert!(h.engine.container_by_name("t1").is_none());
    assert!(h.engine.container_by_name("t1-pause").is_none());
    let net = h.network.state.lock().unwrap();
    assert!(net.veths.is_empty());
    assert!(net.bridges.contains("trex-br0"));
}

#[tokio::test]
async fn nine_byte_prefix_collision_is_refused() {
    let h = harness();
    h.reconciler
        .apply(minimal_sriov_spec("verylongwA"))
        .await
        .unwrap();

    let err = h
        .reconciler
        .apply(minimal_sriov_spec("verylongwB"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ReconcileError::VethPrefixCollision { ref prefix, .. } if prefix == "verylongw"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn validation_failures_touch_nothing_and_are_client_errors() {
    let h = harness();
    let mut spec = minimal_sriov_spec("t1");
    spec.spec.mgmt_ip.clear();

    let err = h.reconciler.apply(spec).await.unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(h.engine.container_count(), 0);
    assert!(h.network.state.lock().unwrap().bridges.is_empty());
}
