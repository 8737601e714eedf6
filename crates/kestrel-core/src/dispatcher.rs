use crate::actor::{ActorContext, PodHandle};
use crate::config::EngineConfig;
use crate::engine::{NetworkReport, ReconcileOutcome, ReconciliationEngine};
use crate::lifecycle::plan_path;
use crate::provisioner::NetworkProvisioner;
use crate::tracker::NetworkTracker;
use crate::CoreError;
use kestrel_schema::{
    NetworkStatus, PodId, PodStatus, RequestId, ScenarioDefinition, ScenarioRegistry,
};
use kestrel_store::{PodRecord, PodRecordStore};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Outcome of [`ScenarioDispatcher::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub restored: usize,
    /// Pods that were awaiting network setup when the process stopped.
    pub interrupted: Vec<PodId>,
}

/// Outcome of [`ScenarioDispatcher::collect_garbage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub retired: Vec<PodId>,
}

/// Reason recorded on pods whose network setup was cut off by a restart.
pub const INTERRUPTED_BY_RESTART: &str = "network setup interrupted by restart";

/// Entry point for scenario triggers, reconciles and completion reports.
///
/// Resolves scenario names against the injected registry, maps each scenario
/// to its pod (the pod id is the scenario name) and forwards the work to that
/// pod's actor, spawning it on first use. Must be used from within a tokio
/// runtime.
pub struct ScenarioDispatcher {
    registry: Arc<dyn ScenarioRegistry>,
    ctx: Arc<ActorContext>,
    pods: RwLock<HashMap<PodId, PodHandle>>,
    /// Highest generation each retired pod reached. A pod created again
    /// continues above it, so its request ids are never issued twice.
    retired_generations: Mutex<HashMap<PodId, u64>>,
}

impl ScenarioDispatcher {
    pub fn new(
        config: EngineConfig,
        registry: Arc<dyn ScenarioRegistry>,
        store: Arc<PodRecordStore>,
        provisioner: Arc<dyn NetworkProvisioner>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let tracker = Arc::new(NetworkTracker::new(config.network_timeout()));
        info!(
            "dispatcher ready: provisioner={}, timeout={:?}, max_retries={}, durable={}",
            provisioner.name(),
            config.network_timeout(),
            config.max_retries,
            store.is_durable()
        );
        Ok(Self {
            registry,
            ctx: Arc::new(ActorContext {
                store,
                tracker,
                provisioner,
                config,
            }),
            pods: RwLock::new(HashMap::new()),
            retired_generations: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn tracker(&self) -> &Arc<NetworkTracker> {
        &self.ctx.tracker
    }

    pub fn store(&self) -> &Arc<PodRecordStore> {
        &self.ctx.store
    }

    /// Reload journaled records and fail every pod that was suspended on a
    /// network request when the previous process stopped. Those requests
    /// can no longer be correlated, so no completion could ever resume them.
    pub fn recover(&self) -> Result<RecoveryReport, CoreError> {
        let restored = self.ctx.store.restore()?;
        let mut report = RecoveryReport {
            restored: restored.len(),
            interrupted: Vec::new(),
        };

        for record in restored {
            if !record.is_suspended() {
                continue;
            }
            let scenario = self.scenario_for(&record);
            let mut engine = ReconciliationEngine::new(record, scenario);
            engine.fail(INTERRUPTED_BY_RESTART);
            self.ctx.store.publish(engine.record().clone())?;
            report.interrupted.push(engine.record().pod_id.clone());
        }

        if !report.interrupted.is_empty() {
            warn!(
                "failed {} pods interrupted mid network setup",
                report.interrupted.len()
            );
        }
        Ok(report)
    }

    /// Start or resume the scenario's pod toward the scenario's final state.
    pub async fn trigger_action(
        &self,
        scenario_name: &str,
    ) -> Result<ReconcileOutcome, CoreError> {
        let scenario = self.resolve(scenario_name)?;
        let pod_id = PodId::from(&scenario.name);

        self.dispatch(&pod_id, &scenario, PodStatus::None, |handle| {
            let scenario = scenario.clone();
            async move { handle.trigger(scenario).await }
        })
        .await
    }

    /// Drive the scenario's pod from `current` to `desired`.
    ///
    /// With no record for the pod, `current` is adopted once the path to
    /// `desired` has been validated. With a record, `current` must match it.
    pub async fn reconcile(
        &self,
        scenario_name: &str,
        current: PodStatus,
        desired: PodStatus,
    ) -> Result<ReconcileOutcome, CoreError> {
        let scenario = self.resolve(scenario_name)?;
        if current == PodStatus::Unknown || desired == PodStatus::Unknown {
            return Err(CoreError::InvalidArgument(
                "UNKNOWN cannot be reconciled".to_owned(),
            ));
        }
        let pod_id = PodId::from(&scenario.name);

        if !self.is_known(&pod_id) {
            if current == desired {
                return Ok(ReconcileOutcome::Completed {
                    pod_id,
                    status: current,
                });
            }
            plan_path(current, desired)?;
        }

        self.dispatch(&pod_id, &scenario, current, |handle| {
            let scenario = scenario.clone();
            async move { handle.reconcile(scenario, current, desired).await }
        })
        .await
    }

    /// Deliver a network completion report. Returns `false` for unknown,
    /// duplicate or late reports, which change nothing.
    pub async fn complete_network_setting(
        &self,
        request_id: &str,
        network_status: NetworkStatus,
        pod_status: PodStatus,
        details: &str,
    ) -> bool {
        let report = NetworkReport {
            network_status,
            pod_status,
            details: details.to_owned(),
        };
        self.ctx
            .tracker
            .complete(&RequestId::new(request_id), report)
            .await
    }

    /// Current record of a pod, consistent with every event already queued
    /// for it.
    pub async fn inspect(&self, pod_id: &str) -> Option<PodRecord> {
        if let Some(handle) = self.live_handle(pod_id) {
            if let Ok(record) = handle.inspect().await {
                return Some(record);
            }
        }
        self.ctx.store.get(pod_id)
    }

    /// Published snapshots of every pod, sorted by pod id.
    pub fn list(&self) -> Vec<PodRecord> {
        self.ctx.store.list()
    }

    pub fn active_pods(&self) -> usize {
        self.pods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Retire terminal pods with no outstanding requests.
    pub async fn collect_garbage(&self) -> Result<GcReport, CoreError> {
        let mut report = GcReport::default();

        for record in self.ctx.store.list() {
            if !record.is_retirable() {
                continue;
            }
            self.remember_generation(&record);
            let retired = match self.live_handle(&record.pod_id) {
                Some(handle) => {
                    let retired = handle.retire().await.unwrap_or(false);
                    if retired {
                        self.forget(&handle);
                    }
                    retired
                }
                None => {
                    self.ctx.store.remove(&record.pod_id)?;
                    true
                }
            };
            if retired {
                debug!("gc retired pod {}", record.pod_id);
                report.retired.push(record.pod_id);
            }
        }

        info!("gc retired {} pods", report.retired.len());
        Ok(report)
    }

    /// Release every pod actor and disarm all deadlines. Pods still awaiting
    /// network setup stay suspended in the store and are failed by the next
    /// [`recover`](Self::recover). Returns the number of cancelled requests.
    pub fn shutdown(&self) -> usize {
        let released = {
            let mut pods = self.pods.write().unwrap_or_else(PoisonError::into_inner);
            let count = pods.len();
            pods.clear();
            count
        };
        let cancelled = self.ctx.tracker.shutdown();
        info!("dispatcher shut down: released {released} pod actors, cancelled {cancelled} requests");
        cancelled
    }

    fn resolve(&self, scenario_name: &str) -> Result<ScenarioDefinition, CoreError> {
        self.registry
            .lookup(scenario_name)
            .ok_or_else(|| CoreError::ScenarioNotFound(scenario_name.to_owned()))
    }

    fn scenario_for(&self, record: &PodRecord) -> ScenarioDefinition {
        self.registry
            .lookup(&record.scenario_name)
            .unwrap_or_else(|| ScenarioDefinition::new(record.scenario_name.clone(), Vec::new()))
    }

    fn is_known(&self, pod_id: &str) -> bool {
        self.live_handle(pod_id).is_some() || self.ctx.store.contains(pod_id)
    }

    fn live_handle(&self, pod_id: &str) -> Option<PodHandle> {
        let pods = self.pods.read().unwrap_or_else(PoisonError::into_inner);
        pods.get(pod_id).filter(|h| !h.is_closed()).cloned()
    }

    fn remember_generation(&self, record: &PodRecord) {
        let mut retired = self
            .retired_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let highest = retired.entry(record.pod_id.clone()).or_insert(0);
        *highest = (*highest).max(record.generation);
    }

    /// First record of a pod with no stored record, starting at `status`.
    fn seed(&self, pod_id: &PodId, scenario: &ScenarioDefinition, status: PodStatus) -> PodRecord {
        let generation = self
            .retired_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pod_id)
            .map_or(1, |highest| highest + 1);
        PodRecord::new(pod_id.clone(), scenario.name.clone(), generation, status)
    }

    /// The pod's actor, spawning one from its stored record (or a fresh
    /// record at `seed_status`) if none is running.
    fn handle_for(
        &self,
        pod_id: &PodId,
        scenario: &ScenarioDefinition,
        seed_status: PodStatus,
    ) -> PodHandle {
        if let Some(handle) = self.live_handle(pod_id) {
            return handle;
        }

        let mut pods = self.pods.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pods.get(pod_id).filter(|h| !h.is_closed()) {
            return handle.clone();
        }
        let record = self
            .ctx
            .store
            .get(pod_id)
            .unwrap_or_else(|| self.seed(pod_id, scenario, seed_status));
        let engine = ReconciliationEngine::new(record, scenario.clone());
        let handle = PodHandle::spawn(engine, Arc::clone(&self.ctx));
        pods.insert(pod_id.clone(), handle.clone());
        handle
    }

    fn forget(&self, handle: &PodHandle) {
        let mut pods = self.pods.write().unwrap_or_else(PoisonError::into_inner);
        if pods
            .get(handle.pod_id())
            .is_some_and(|current| current.same_actor(handle))
        {
            pods.remove(handle.pod_id());
        }
    }

    /// Run `call` against the pod's actor. An actor that stopped between
    /// lookup and delivery (retired by gc) is replaced once.
    async fn dispatch<F, Fut>(
        &self,
        pod_id: &PodId,
        scenario: &ScenarioDefinition,
        seed_status: PodStatus,
        call: F,
    ) -> Result<ReconcileOutcome, CoreError>
    where
        F: Fn(PodHandle) -> Fut,
        Fut: Future<Output = Result<ReconcileOutcome, CoreError>>,
    {
        let mut result = Err(CoreError::ActorUnavailable(pod_id.to_string()));
        for _ in 0..2 {
            let handle = self.handle_for(pod_id, scenario, seed_status);
            result = call(handle.clone()).await;
            if matches!(result, Err(CoreError::ActorUnavailable(_))) {
                self.forget(&handle);
                continue;
            }
            break;
        }
        result
    }
}
