//! HTTP boundary end-to-end tests.
//!
//! These tests start a real `kestrel-server` in-process on a random port and
//! drive it with a real HTTP client. No mocks beyond the recording
//! provisioner standing in for the network subsystem.

use kestrel_core::{
    EngineConfig, NetworkProvisioner, NetworkSetupRequest, ProvisionError, RecordingProvisioner,
};
use kestrel_server::{HttpProvisioner, TestServer};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

/// Holds setup requests for the `boot` pod until the gate opens; every
/// other pod passes straight through to `inner`.
struct GatedProvisioner {
    gate: Mutex<mpsc::Receiver<()>>,
    inner: RecordingProvisioner,
}

impl NetworkProvisioner for GatedProvisioner {
    fn name(&self) -> &str {
        "gated"
    }

    fn request_setup(&self, request: &NetworkSetupRequest) -> Result<(), ProvisionError> {
        if request.pod_id.as_str() == "boot" {
            let gate = self.gate.lock().unwrap();
            gate.recv_timeout(Duration::from_secs(5))
                .map_err(|e| ProvisionError::Unreachable(e.to_string()))?;
        }
        self.inner.request_setup(request)
    }
}

fn start_server() -> (TestServer, Arc<RecordingProvisioner>) {
    start_server_with(EngineConfig::default())
}

fn start_server_with(config: EngineConfig) -> (TestServer, Arc<RecordingProvisioner>) {
    let provisioner = Arc::new(RecordingProvisioner::new());
    let server = TestServer::start(config, provisioner.clone()).unwrap();
    (server, provisioner)
}

fn read_body(resp: ureq::http::Response<ureq::Body>) -> Value {
    let mut reader = resp.into_body().into_reader();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(server: &TestServer, path: &str, body: &Value) -> Value {
    let resp = ureq::post(&format!("{}{path}", server.url))
        .header("Content-Type", "application/json")
        .send(body.to_string().as_bytes())
        .unwrap();
    read_body(resp)
}

fn get(server: &TestServer, path: &str) -> Value {
    read_body(ureq::get(&format!("{}{path}", server.url)).call().unwrap())
}

fn http_code<T>(result: Result<T, ureq::Error>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(ureq::Error::StatusCode(code)) => code,
        Err(e) => panic!("transport error: {e}"),
    }
}

fn trigger(server: &TestServer, scenario: &str) -> Value {
    post(server, "/v1/trigger-action", &json!({ "scenario_name": scenario }))
}

fn reconcile(server: &TestServer, scenario: &str, current: i32, desired: i32) -> Value {
    post(
        server,
        "/v1/reconcile",
        &json!({ "scenario_name": scenario, "current": current, "desired": desired }),
    )
}

fn complete(server: &TestServer, request_id: &str, network_status: i32, pod_status: i32) -> bool {
    let reply = post(
        server,
        "/v1/complete-network-setting",
        &json!({
            "request_id": request_id,
            "network_status": network_status,
            "pod_status": pod_status,
        }),
    );
    reply["acknowledged"].as_bool().unwrap()
}

fn wait_for_status(server: &TestServer, pod_id: &str, expected: &str) -> Value {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let pod = get(server, &format!("/v1/pods/{pod_id}"));
        if pod["current_status"] == expected {
            return pod;
        }
        assert!(
            Instant::now() < deadline,
            "pod {pod_id} never reached {expected}: {pod}"
        );
        std::thread::sleep(Duration::from_millis(20));
    }
}

// --- Tests ---

#[test]
fn health() {
    let (server, _) = start_server();
    assert_eq!(get(&server, "/health")["status"], "ok");
}

#[test]
fn boot_runs_through_network_setup() {
    let (server, provisioner) = start_server();

    let reply = trigger(&server, "boot");
    assert_eq!(reply["status"], 0);
    let request = provisioner.last().unwrap();
    assert!(reply["desc"]
        .as_str()
        .unwrap()
        .contains(request.request_id.as_str()));

    let pod = get(&server, "/v1/pods/boot");
    assert_eq!(pod["current_status"], "INIT");
    assert_eq!(pod["outstanding_requests"][0], request.request_id.as_str());

    assert!(complete(&server, &request.request_id, 0, 2));
    let pod = wait_for_status(&server, "boot", "RUNNING");
    assert_eq!(pod["history"], json!(["INIT", "READY", "RUNNING"]));
    assert_eq!(pod["outstanding_requests"], json!([]));
}

#[test]
fn backward_reconcile_is_invalid_transition() {
    let (server, provisioner) = start_server();
    trigger(&server, "boot");
    let request_id = provisioner.last().unwrap().request_id;
    assert!(complete(&server, &request_id, 0, 2));
    wait_for_status(&server, "boot", "RUNNING");

    let reply = reconcile(&server, "boot", 3, 1);
    assert_eq!(reply["status"], 2);
    assert_eq!(get(&server, "/v1/pods/boot")["current_status"], "RUNNING");
}

#[test]
fn unknown_scenario_is_not_found() {
    let (server, provisioner) = start_server();
    let reply = trigger(&server, "no-such-scenario");
    assert_eq!(reply["status"], 1);
    assert_eq!(reconcile(&server, "no-such-scenario", 0, 1)["status"], 1);
    assert!(provisioner.is_empty());
}

#[test]
fn unknown_and_out_of_range_statuses_are_invalid_argument() {
    let (server, _) = start_server();
    assert_eq!(reconcile(&server, "boot", 6, 3)["status"], 3);
    assert_eq!(reconcile(&server, "boot", 0, 6)["status"], 3);
    assert_eq!(reconcile(&server, "boot", 0, 99)["status"], 3);
    assert_eq!(reconcile(&server, "boot", -1, 3)["status"], 3);
    assert!(!complete(&server, "boot-g1-s2-a0", 7, 2));
}

#[test]
fn second_trigger_while_suspended_is_busy() {
    let (server, provisioner) = start_server();
    assert_eq!(trigger(&server, "boot")["status"], 0);
    assert_eq!(trigger(&server, "boot")["status"], 4);
    assert_eq!(provisioner.len(), 1);
}

#[test]
fn duplicate_completion_is_not_acknowledged() {
    let (server, provisioner) = start_server();
    trigger(&server, "boot");
    let request_id = provisioner.last().unwrap().request_id;

    assert!(complete(&server, &request_id, 0, 2));
    assert!(!complete(&server, &request_id, 0, 2));
    assert!(!complete(&server, "never-issued", 0, 2));
    wait_for_status(&server, "boot", "RUNNING");
}

#[test]
fn network_error_fails_the_pod() {
    let (server, provisioner) = start_server();
    trigger(&server, "boot");
    let request_id = provisioner.last().unwrap().request_id;

    assert!(complete(&server, &request_id, 1, 2));
    let pod = wait_for_status(&server, "boot", "FAILED");
    assert!(pod["last_error"].as_str().is_some());
}

#[test]
fn deadline_expiry_fails_the_pod_and_rejects_late_report() {
    let (server, provisioner) = start_server_with(EngineConfig {
        network_timeout_ms: 200,
        ..EngineConfig::default()
    });
    trigger(&server, "boot");
    let request_id = provisioner.last().unwrap().request_id;

    let pod = wait_for_status(&server, "boot", "FAILED");
    assert!(pod["last_error"].as_str().unwrap().contains("timed out"));
    assert!(!complete(&server, &request_id, 0, 2));

    let reply = reconcile(&server, "boot", 5, 3);
    assert_eq!(reply["status"], 5);
    assert!(reply["desc"].as_str().unwrap().contains(request_id.as_str()));
}

#[test]
fn slow_pod_does_not_stall_other_requests() {
    let (open, gate) = mpsc::channel();
    let provisioner = Arc::new(GatedProvisioner {
        gate: Mutex::new(gate),
        inner: RecordingProvisioner::new(),
    });
    let server = Arc::new(TestServer::start(EngineConfig::default(), provisioner.clone()).unwrap());

    let slow = {
        let server = Arc::clone(&server);
        std::thread::spawn(move || trigger(&server, "boot"))
    };
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.dispatcher.active_pods() == 0 {
        assert!(Instant::now() < deadline, "boot was never dispatched");
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(get(&server, "/health")["status"], "ok");
    assert_eq!(trigger(&server, "oneshot")["status"], 0);
    assert_eq!(provisioner.inner.len(), 1);
    assert!(!slow.is_finished());

    open.send(()).unwrap();
    assert_eq!(slow.join().unwrap()["status"], 0);
    assert_eq!(provisioner.inner.len(), 2);
}

#[test]
fn malformed_request_is_bad_request() {
    let (server, _) = start_server();
    let code = http_code(
        ureq::post(&format!("{}/v1/trigger-action", server.url))
            .header("Content-Type", "application/json")
            .send(&b"{not json"[..]),
    );
    assert_eq!(code, 400);

    let code = http_code(
        ureq::post(&format!("{}/v1/reconcile", server.url))
            .send(&br#"{"scenario_name":"boot","current":"INIT","desired":3}"#[..]),
    );
    assert_eq!(code, 400);
}

#[test]
fn unknown_route_and_wrong_method() {
    let (server, _) = start_server();
    assert_eq!(
        http_code(ureq::get(&format!("{}/v1/nothing", server.url)).call()),
        404
    );
    assert_eq!(
        http_code(ureq::get(&format!("{}/v1/trigger-action", server.url)).call()),
        405
    );
    assert_eq!(
        http_code(ureq::get(&format!("{}/v1/pods/ghost", server.url)).call()),
        404
    );
}

#[test]
fn gc_retires_finished_pods() {
    let (server, provisioner) = start_server();
    trigger(&server, "oneshot");
    let request_id = provisioner.last().unwrap().request_id;
    assert!(complete(&server, &request_id, 0, 2));
    wait_for_status(&server, "oneshot", "DONE");

    trigger(&server, "boot");
    assert_eq!(get(&server, "/v1/pods").as_array().unwrap().len(), 2);

    let report = post(&server, "/v1/gc", &json!({}));
    assert_eq!(report["retired"], json!(["oneshot"]));

    let pods = get(&server, "/v1/pods");
    assert_eq!(pods.as_array().unwrap().len(), 1);
    assert_eq!(pods[0]["pod_id"], "boot");
    assert_eq!(
        http_code(ureq::get(&format!("{}/v1/pods/oneshot", server.url)).call()),
        404
    );
}

#[test]
fn http_provisioner_round_trip() {
    let network = Arc::new(tiny_http::Server::http("127.0.0.1:0").unwrap());
    let network_port = network.server_addr().to_ip().unwrap().port();
    let provisioner = Arc::new(HttpProvisioner::new(&format!(
        "http://127.0.0.1:{network_port}/setup/"
    )));
    let server = TestServer::start(EngineConfig::default(), provisioner).unwrap();

    // Stand-in network subsystem: acknowledge the setup request, then report
    // success back through the boundary.
    let kestrel_url = server.url.clone();
    let net = Arc::clone(&network);
    let fake = std::thread::spawn(move || {
        let mut req = net
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .expect("no setup request received");
        assert_eq!(req.url(), "/setup");
        let mut body = Vec::new();
        req.as_reader().read_to_end(&mut body).unwrap();
        let setup: NetworkSetupRequest = serde_json::from_slice(&body).unwrap();
        req.respond(tiny_http::Response::from_string("accepted"))
            .unwrap();

        let reply = ureq::post(&format!("{kestrel_url}/v1/complete-network-setting"))
            .send(
                json!({
                    "request_id": setup.request_id.as_str(),
                    "network_status": 0,
                    "pod_status": setup.target.as_i32(),
                    "details": "bridge attached",
                })
                .to_string()
                .as_bytes(),
            )
            .unwrap();
        read_body(reply)["acknowledged"].as_bool().unwrap()
    });

    assert_eq!(trigger(&server, "boot")["status"], 0);
    assert!(fake.join().unwrap());
    wait_for_status(&server, "boot", "RUNNING");
}
