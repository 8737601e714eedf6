//! HTTP boundary for the Kestrel reconciliation engine.
//!
//! Routes (JSON bodies, see [`wire`]):
//! - `GET  /health`
//! - `POST /v1/trigger-action`
//! - `POST /v1/reconcile`
//! - `POST /v1/complete-network-setting`
//! - `GET  /v1/pods`, `GET /v1/pods/{pod_id}`
//! - `POST /v1/gc`
//!
//! Operation outcomes travel in the reply body's `status` field; HTTP error
//! codes are reserved for malformed requests and unknown routes.
//!
//! The [`TestServer`] helper starts a server on a random port for integration testing.

pub mod adapter;
pub mod config;
pub mod provisioner;
pub mod wire;

pub use adapter::{status_code, BoundaryAdapter, STATUS_OK};
pub use config::ServerConfig;
pub use provisioner::HttpProvisioner;

use kestrel_core::{
    shutdown_requested, CoreError, EngineConfig, LoggingProvisioner, NetworkProvisioner,
    ScenarioDispatcher,
};
use kestrel_schema::{ScenarioRegistry, SchemaError, StaticRegistry};
use kestrel_store::{FileJournal, PodRecordStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tracing::{debug, error, info};
use wire::{CompleteNetworkSettingRequest, CompleteReply, ReconcileRequest, TriggerActionRequest};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const TEST_WORKERS: usize = 4;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("scenario error: {0}")]
    Schema(#[from] SchemaError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Health,
    TriggerAction,
    Reconcile,
    CompleteNetworkSetting,
    Pods,
    Pod(&'a str),
    Gc,
    MethodNotAllowed,
    NotFound,
}

/// Match a request line to a route. The query string is ignored.
pub fn parse_route<'a>(method: &Method, url: &'a str) -> Route<'a> {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    let (expected, route) = match path {
        "/health" => (Method::Get, Route::Health),
        "/v1/trigger-action" => (Method::Post, Route::TriggerAction),
        "/v1/reconcile" => (Method::Post, Route::Reconcile),
        "/v1/complete-network-setting" => (Method::Post, Route::CompleteNetworkSetting),
        "/v1/pods" => (Method::Get, Route::Pods),
        "/v1/gc" => (Method::Post, Route::Gc),
        _ => match path.strip_prefix("/v1/pods/") {
            Some(id) if !id.is_empty() && !id.contains('/') => (Method::Get, Route::Pod(id)),
            _ => return Route::NotFound,
        },
    };
    if *method == expected {
        route
    } else {
        Route::MethodNotAllowed
    }
}

fn respond_err(req: Request, code: u16, msg: &str) {
    let _ = req.respond(Response::from_string(msg).with_status_code(StatusCode(code)));
}

fn respond_json(req: Request, value: &impl Serialize) {
    let body = match serde_json::to_vec(value) {
        Ok(body) => body,
        Err(e) => {
            error!("failed to encode reply: {e}");
            respond_err(req, 500, "encode error");
            return;
        }
    };
    let mut response = Response::from_data(body);
    if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
        response = response.with_header(header);
    }
    let _ = req.respond(response);
}

fn read_json<T: DeserializeOwned>(req: &mut Request) -> Result<T, String> {
    let mut body = Vec::new();
    req.as_reader()
        .read_to_end(&mut body)
        .map_err(|e| format!("read error: {e}"))?;
    serde_json::from_slice(&body).map_err(|e| format!("malformed request: {e}"))
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(adapter: &BoundaryAdapter, mut req: Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    match parse_route(&method, &url) {
        Route::Health => respond_json(req, &serde_json::json!({ "status": "ok" })),
        Route::TriggerAction => match read_json::<TriggerActionRequest>(&mut req) {
            Ok(body) => {
                let reply = adapter.trigger_action(&body.scenario_name);
                respond_json(req, &reply);
            }
            Err(msg) => respond_err(req, 400, &msg),
        },
        Route::Reconcile => match read_json::<ReconcileRequest>(&mut req) {
            Ok(body) => {
                let reply = adapter.reconcile(&body.scenario_name, body.current, body.desired);
                respond_json(req, &reply);
            }
            Err(msg) => respond_err(req, 400, &msg),
        },
        Route::CompleteNetworkSetting => {
            match read_json::<CompleteNetworkSettingRequest>(&mut req) {
                Ok(body) => {
                    let acknowledged = adapter.complete_network_setting(
                        &body.request_id,
                        body.network_status,
                        body.pod_status,
                        &body.details,
                    );
                    respond_json(req, &CompleteReply { acknowledged });
                }
                Err(msg) => respond_err(req, 400, &msg),
            }
        }
        Route::Pods => respond_json(req, &adapter.pods()),
        Route::Pod(pod_id) => match adapter.pod(pod_id) {
            Some(record) => respond_json(req, &record),
            None => respond_err(req, 404, "not found"),
        },
        Route::Gc => match adapter.collect_garbage() {
            Ok(report) => respond_json(req, &report),
            Err(e) => {
                error!("gc failed: {e}");
                respond_err(req, 500, &e.to_string());
            }
        },
        Route::MethodNotAllowed => respond_err(req, 405, "method not allowed"),
        Route::NotFound => respond_err(req, 404, "not found"),
    }
}

/// Assemble the dispatcher described by `config`: built-in scenarios plus
/// the optional scenario file, an optional journal, and the HTTP
/// provisioner when an endpoint is configured.
pub fn build_dispatcher(config: &ServerConfig) -> Result<ScenarioDispatcher, ServerError> {
    let registry = match &config.scenario_file {
        Some(path) => StaticRegistry::builtin_with_file(path)?,
        None => StaticRegistry::builtin()?,
    };
    info!("loaded {} scenarios: {}", registry.len(), registry.names().join(", "));

    let store = match &config.journal_dir {
        Some(dir) => {
            info!("journal directory: {}", dir.display());
            PodRecordStore::with_journal(Arc::new(FileJournal::open(dir.clone())?))
        }
        None => PodRecordStore::new(),
    };

    let provisioner: Arc<dyn NetworkProvisioner> = match &config.provisioner_url {
        Some(url) => Arc::new(HttpProvisioner::new(url)),
        None => Arc::new(LoggingProvisioner),
    };

    Ok(ScenarioDispatcher::new(
        config.engine.clone(),
        Arc::new(registry),
        Arc::new(store),
        provisioner,
    )?)
}

pub fn bind(addr: &str) -> Result<Server, ServerError> {
    Server::http(addr).map_err(|e| ServerError::Bind {
        addr: addr.to_owned(),
        reason: e.to_string(),
    })
}

/// Serve requests on `workers` threads until a shutdown is requested.
pub fn run_server(
    adapter: &BoundaryAdapter,
    server: &Server,
    workers: usize,
) -> Result<(), ServerError> {
    serve_until(adapter, server, workers, &shutdown_requested)?;
    info!("shutdown requested, stopping HTTP server");
    Ok(())
}

/// Serve requests on a pool of `workers` threads until `stop` returns true.
///
/// Each worker pulls its own requests from `server`, so a request blocked
/// on one pod leaves the others free. The first worker error stops the
/// whole pool and is returned once every worker has exited.
pub fn serve_until(
    adapter: &BoundaryAdapter,
    server: &Server,
    workers: usize,
    stop: &(dyn Fn() -> bool + Sync),
) -> Result<(), ServerError> {
    let failed = AtomicBool::new(false);
    let should_stop = || failed.load(Ordering::Acquire) || stop();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers.max(1) {
            let spawned = thread::Builder::new()
                .name(format!("kestrel-http-{worker}"))
                .spawn_scoped(scope, || {
                    let result = serve_requests(adapter, server, &should_stop);
                    if result.is_err() {
                        failed.store(true, Ordering::Release);
                    }
                    result
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    failed.store(true, Ordering::Release);
                    error!("failed to spawn HTTP worker {worker}: {e}");
                    return Err(ServerError::Io(e));
                }
            }
        }
        debug!("serving HTTP on {} workers", handles.len());

        let mut outcome = Ok(());
        for handle in handles {
            let result = handle.join().unwrap_or_else(|_| {
                failed.store(true, Ordering::Release);
                Err(ServerError::Io(std::io::Error::other("HTTP worker panicked")))
            });
            if let Err(e) = result {
                error!("{e}");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    })
}

fn serve_requests(
    adapter: &BoundaryAdapter,
    server: &Server,
    should_stop: &dyn Fn() -> bool,
) -> Result<(), ServerError> {
    while !should_stop() {
        if let Some(request) = server.recv_timeout(POLL_INTERVAL)? {
            handle_request(adapter, request);
        }
    }
    Ok(())
}

/// A test helper that serves a fresh in-memory dispatcher on a random port
/// from a background thread, with its own tokio runtime.
///
/// Drop the `TestServer` to stop the server.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub dispatcher: Arc<ScenarioDispatcher>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    runtime: Option<tokio::runtime::Runtime>,
}

impl TestServer {
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(
        config: EngineConfig,
        provisioner: Arc<dyn NetworkProvisioner>,
    ) -> Result<Self, ServerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let dispatcher = Arc::new(ScenarioDispatcher::new(
            config,
            Arc::new(StaticRegistry::builtin()?),
            Arc::new(PodRecordStore::new()),
            provisioner,
        )?);

        let server = bind("127.0.0.1:0")?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| ServerError::Bind {
                addr: "127.0.0.1:0".to_owned(),
                reason: "not an IP address".to_owned(),
            })?;
        let url = format!("http://127.0.0.1:{port}");

        let adapter = BoundaryAdapter::new(Arc::clone(&dispatcher), runtime.handle().clone());
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("kestrel-test-server".to_owned())
            .spawn(move || {
                let should_stop = move || stopped.load(Ordering::Acquire);
                if let Err(e) = serve_until(&adapter, &server, TEST_WORKERS, &should_stop) {
                    error!("test server stopped: {e}");
                }
            })?;

        Ok(Self {
            url,
            port,
            dispatcher,
            stop,
            handle: Some(handle),
            runtime: Some(runtime),
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.dispatcher.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
