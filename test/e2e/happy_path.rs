//! End-to-end sync flows against a mock inventory API.
//!
//! These tests drive the public pipelines the CLI uses, verifying:
//!
//! 1. VLAN sync: switch output → VLAN group creates and deletes
//! 2. VLAN dry run: the same plan without a single write
//! 3. VLAN rerun: once converged, a second sync writes nothing
//! 4. VM sync: snapshot file → VM creates, IP detach and VM delete
//!
//! ## Running
//!
//! ```bash
//! cargo test -p netsync-e2e --test happy_path
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use netsync_agent::config::InventoryConfig;
use netsync_agent::inventory::models::Device;
use netsync_agent::inventory::{NetBoxClient, NetBoxVlanGateway, NetBoxVmGateway};
use netsync_agent::observer::VlanObserver;
use netsync_agent::sync::{sync_vlans, sync_vms};
use netsync_agent::transport::ScriptedTransport;
use netsync_agent::vm::{cluster_observations, DiskFacts, VmFacts, VmSnapshot};
use netsync_reconcile::{AggregateReport, ApplyMode, OrchestratorConfig};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHOW_VLAN: &str = "\
VLAN Name                             Status    Ports
---- -------------------------------- --------- -------------------------------
100  a                                active    Gi0/1
200  b                                active    Gi0/2
";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netsync_agent=debug")
        .with_test_writer()
        .try_init();
}

fn client(server: &MockServer) -> NetBoxClient {
    NetBoxClient::new(&InventoryConfig {
        url: server.uri(),
        token: "e2e-token".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn page(results: Value) -> ResponseTemplate {
    let count = results.as_array().map_or(0, Vec::len);
    ResponseTemplate::new(200).set_body_json(json!({"count": count, "next": null, "results": results}))
}

fn switch() -> Device {
    serde_json::from_value(json!({
        "id": 1,
        "name": "sw1",
        "site": {"id": 3, "name": "dc1"},
        "platform": {"id": 1, "name": "ios"},
        "status": {"value": "active", "label": "Active"},
        "primary_ip": {"id": 9, "address": "10.0.0.1/24"},
    }))
    .unwrap()
}

async fn mount_vlan_group(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/ipam/vlan-groups/"))
        .and(query_param("name", "sw1"))
        .respond_with(page(json!([{"id": 11, "name": "sw1", "slug": "sw1"}])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ipam/vlans/"))
        .and(query_param("group_id", "11"))
        .respond_with(page(json!([
            {"id": 2, "vid": 100, "name": "a", "status": {"value": "active"}},
            {"id": 3, "vid": 300, "name": "c", "status": {"value": "active"}},
        ])))
        .mount(server)
        .await;
}

async fn run_vlan_sync(server: &MockServer, mode: ApplyMode) -> AggregateReport {
    let transport = ScriptedTransport::new().with_command("10.0.0.1", "show vlan", SHOW_VLAN);
    let client = client(server);
    sync_vlans(
        vec![switch()],
        VlanObserver::new(Arc::new(transport)),
        move |target| Arc::new(NetBoxVlanGateway::new(client.clone(), target.site_id)),
        OrchestratorConfig::default(),
        mode,
    )
    .await
}

#[tokio::test]
async fn vlan_sync_converges_device_group() {
    init_tracing();
    let server = MockServer::start().await;
    mount_vlan_group(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/ipam/vlans/"))
        .and(body_json(json!({
            "site": 3, "group": 11, "vid": 200, "name": "b", "status": "active",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 4})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/ipam/vlans/3/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = run_vlan_sync(&server, ApplyMode::Apply).await;

    assert!(!report.has_failures(), "{report:?}");
    let result = report.target("sw1").unwrap().outcome.result().unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.deleted, 1);
    assert_eq!(result.unchanged, 1);
    assert!(!result.dry_run);
}

#[tokio::test]
async fn vlan_dry_run_writes_nothing() {
    init_tracing();
    let server = MockServer::start().await;
    mount_vlan_group(&server).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 99})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let report = run_vlan_sync(&server, ApplyMode::DryRun).await;

    let result = report.target("sw1").unwrap().outcome.result().unwrap();
    assert!(result.dry_run);
    assert_eq!((result.created, result.deleted), (1, 1));
}

#[tokio::test]
async fn vlan_second_sync_writes_nothing() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/ipam/vlan-groups/"))
        .and(query_param("name", "sw1"))
        .respond_with(page(json!([{"id": 11, "name": "sw1", "slug": "sw1"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ipam/vlans/"))
        .and(query_param("group_id", "11"))
        .respond_with(page(json!([
            {"id": 2, "vid": 100, "name": "a", "status": {"value": "active"}},
            {"id": 3, "vid": 300, "name": "c", "status": {"value": "active"}},
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // What the first run left behind.
    Mock::given(method("GET"))
        .and(path("/api/ipam/vlans/"))
        .and(query_param("group_id", "11"))
        .respond_with(page(json!([
            {"id": 2, "vid": 100, "name": "a", "status": {"value": "active", "label": "Active"}},
            {"id": 4, "vid": 200, "name": "b", "status": {"value": "active", "label": "Active"}},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ipam/vlans/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 4})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2})))
        .expect(0)
        .mount(&server)
        .await;

    let first = run_vlan_sync(&server, ApplyMode::Apply).await;
    let first = first.target("sw1").unwrap().outcome.result().unwrap().clone();
    assert_eq!((first.created, first.deleted), (1, 1));

    let second = run_vlan_sync(&server, ApplyMode::Apply).await;
    assert!(!second.has_failures(), "{second:?}");
    let result = second.target("sw1").unwrap().outcome.result().unwrap();
    assert_eq!(result.succeeded(), 0);
    assert_eq!(result.unchanged, 2);
}

#[tokio::test]
async fn vm_sync_from_snapshot_detaches_before_delete() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/virtualization/clusters/"))
        .and(query_param("name", "CL-01"))
        .respond_with(page(json!([{"id": 7, "name": "CL-01"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/virtualization/virtual-machines/"))
        .and(query_param("cluster_id", "7"))
        .respond_with(page(json!([
            {"id": 50, "name": "old01", "status": {"value": "active"}, "custom_fields": {}},
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/virtualization/virtual-machines/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 51})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/ipam/ip-addresses/"))
        .and(query_param("virtual_machine_id", "50"))
        .respond_with(page(json!([{
            "id": 900,
            "address": "10.1.1.5/24",
            "assigned_object_type": "virtualization.vminterface",
            "assigned_object_id": 77,
        }])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/ipam/ip-addresses/900/"))
        .and(body_json(json!({"assigned_object_type": null, "assigned_object_id": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 900})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/virtualization/virtual-machines/50/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let facts = VmFacts {
        id: "vm-101".into(),
        power_state: "POWERED_ON".into(),
        cpu_count: 4,
        memory_mib: 8192,
        guest_os: None,
        folder: None,
        disks: vec![DiskFacts {
            label: "Hard disk 1".into(),
            path: "[DS-SAS-01] app01/app01.vmdk".into(),
            capacity_bytes: 40 << 30,
            thin_provisioned: None,
        }],
        mac_addresses: vec!["00:50:56:aa:bb:cc".into()],
        has_snapshot: None,
    };
    let hosts = BTreeMap::from([(
        "esx01".to_string(),
        BTreeMap::from([("app01".to_string(), facts)]),
    )]);
    let datacenters = BTreeMap::from([(
        "DC1".to_string(),
        BTreeMap::from([("CL-01".to_string(), hosts)]),
    )]);

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("output.json");
    VmSnapshot::new("https://vcenter.example", datacenters)
        .unwrap()
        .write(&file)
        .await
        .unwrap();

    let snapshot = VmSnapshot::load(&file).await.unwrap();
    let clusters = cluster_observations(&snapshot, 64);
    let gateway = Arc::new(NetBoxVmGateway::new(client(&server), "vSphere"));
    let report = sync_vms(clusters, gateway, OrchestratorConfig::default(), ApplyMode::Apply).await;

    assert!(!report.has_failures(), "{report:?}");
    let result = report.target("CL-01").unwrap().outcome.result().unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.deleted, 1);
    assert_eq!(result.detached, 1);
}
