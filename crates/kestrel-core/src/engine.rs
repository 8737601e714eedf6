use crate::lifecycle::{plan_path, validate_transition};
use crate::CoreError;
use kestrel_schema::{NetworkStatus, PodId, PodStatus, RequestId, ScenarioDefinition};
use kestrel_store::PodRecord;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// A completion report for a network setup request, either received from the
/// network subsystem or synthesized when the deadline expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkReport {
    pub network_status: NetworkStatus,
    /// State the network subsystem believes the pod reached.
    pub pod_status: PodStatus,
    pub details: String,
}

impl NetworkReport {
    pub fn ok(pod_status: PodStatus) -> Self {
        Self {
            network_status: NetworkStatus::Ok,
            pod_status,
            details: String::new(),
        }
    }

    pub fn error(pod_status: PodStatus, details: impl Into<String>) -> Self {
        Self {
            network_status: NetworkStatus::Error,
            pod_status,
            details: details.into(),
        }
    }

    pub fn timeout(pod_status: PodStatus, details: impl Into<String>) -> Self {
        Self {
            network_status: NetworkStatus::Timeout,
            pod_status,
            details: details.into(),
        }
    }
}

/// The suspended step of a pod: entering `target` waits on `request_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkStep {
    pub request_id: RequestId,
    pub target: PodStatus,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No steps remain; the pod holds the given status.
    Settled(PodStatus),
    /// Progress is suspended until the step's request settles.
    AwaitingNetwork(NetworkStep),
    /// The pod entered `FAILED` with this reason.
    Failed(String),
}

/// Result of a trigger or reconcile call as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed {
        pod_id: PodId,
        status: PodStatus,
    },
    InProgress {
        pod_id: PodId,
        status: PodStatus,
        request_id: RequestId,
    },
}

impl ReconcileOutcome {
    pub fn pod_id(&self) -> &PodId {
        match self {
            Self::Completed { pod_id, .. } | Self::InProgress { pod_id, .. } => pod_id,
        }
    }

    /// Status the pod held when the call returned.
    pub fn status(&self) -> PodStatus {
        match self {
            Self::Completed { status, .. } | Self::InProgress { status, .. } => *status,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }
}

/// Lifecycle state machine for one pod.
///
/// Owns the current generation's record and the remaining plan toward the
/// desired state. Performs no I/O: callers publish the record, register
/// request ids with the tracker and call the provisioner based on the
/// returned [`StepOutcome`].
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    record: PodRecord,
    scenario: ScenarioDefinition,
    plan: VecDeque<PodStatus>,
    pending: Option<NetworkStep>,
}

impl ReconciliationEngine {
    pub fn new(record: PodRecord, scenario: ScenarioDefinition) -> Self {
        Self {
            record,
            scenario,
            plan: VecDeque::new(),
            pending: None,
        }
    }

    pub fn record(&self) -> &PodRecord {
        &self.record
    }

    pub fn scenario(&self) -> &ScenarioDefinition {
        &self.scenario
    }

    pub fn pending(&self) -> Option<&NetworkStep> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_scenario(&mut self, scenario: ScenarioDefinition) {
        self.scenario = scenario;
    }

    /// Replace a terminal generation with a fresh one at `NONE`.
    pub fn start_next_generation(&mut self, scenario: ScenarioDefinition) {
        let next = self.record.next_generation(scenario.name.clone());
        info!(
            "pod {} starting generation {} (previous ended {})",
            next.pod_id, next.generation, self.record.current_status
        );
        self.record = next;
        self.scenario = scenario;
        self.plan.clear();
        self.pending = None;
    }

    fn busy_error(&self, step: &NetworkStep) -> CoreError {
        CoreError::Busy {
            pod_id: self.record.pod_id.to_string(),
            request_id: step.request_id.to_string(),
        }
    }

    /// Set a new desired status and compute the path toward it.
    pub fn plan(&mut self, desired: PodStatus) -> Result<(), CoreError> {
        if let Some(step) = &self.pending {
            return Err(self.busy_error(step));
        }
        let path = plan_path(self.record.current_status, desired)?;
        debug!(
            "pod {} planned {} -> {} via {path:?}",
            self.record.pod_id, self.record.current_status, desired
        );
        self.record.desired_status = desired;
        self.plan = path.into();
        Ok(())
    }

    /// Apply local steps until the plan is exhausted or a step needs network.
    pub fn advance(&mut self) -> StepOutcome {
        if let Some(step) = &self.pending {
            return StepOutcome::AwaitingNetwork(step.clone());
        }
        while let Some(target) = self.plan.pop_front() {
            if self.scenario.requires_network(target) {
                let step = NetworkStep {
                    request_id: self.request_id_for(target, 0),
                    target,
                    attempt: 0,
                };
                self.suspend(step.clone());
                return StepOutcome::AwaitingNetwork(step);
            }
            if let Err(e) = self.enter(target) {
                return self.fail(e.to_string());
            }
        }
        StepOutcome::Settled(self.record.current_status)
    }

    /// Resume a suspended step from its completion report.
    ///
    /// Fails with [`CoreError::StaleReport`] and leaves the pod untouched if
    /// `request_id` is not the step currently awaited.
    pub fn apply_network_report(
        &mut self,
        request_id: &RequestId,
        report: &NetworkReport,
    ) -> Result<StepOutcome, CoreError> {
        let step = match &self.pending {
            Some(step) if step.request_id == *request_id => step.clone(),
            _ => return Err(CoreError::StaleReport(request_id.to_string())),
        };
        self.pending = None;
        self.record.outstanding_requests.remove(request_id);

        match report.network_status {
            NetworkStatus::Ok => {
                if report.pod_status != step.target {
                    let cause = CoreError::ConfirmationMismatch {
                        request_id: request_id.to_string(),
                        expected: step.target,
                        reported: report.pod_status,
                    };
                    return Ok(self.fail(cause.to_string()));
                }
                if let Err(e) = self.enter(step.target) {
                    return Ok(self.fail(e.to_string()));
                }
                Ok(self.advance())
            }
            NetworkStatus::Error | NetworkStatus::Timeout => {
                let reason = if report.details.is_empty() {
                    format!(
                        "network setup {request_id} reported {}",
                        report.network_status
                    )
                } else {
                    report.details.clone()
                };
                Ok(self.fail(reason))
            }
        }
    }

    /// Re-issue the suspended step under a fresh request id.
    ///
    /// Returns `None` when `request_id` is not the step currently awaited.
    pub fn retry(&mut self, request_id: &RequestId) -> Option<NetworkStep> {
        let previous = self
            .pending
            .as_ref()
            .filter(|step| step.request_id == *request_id)?
            .clone();
        let attempt = previous.attempt + 1;
        let step = NetworkStep {
            request_id: self.request_id_for(previous.target, attempt),
            target: previous.target,
            attempt,
        };
        self.record.outstanding_requests.remove(&previous.request_id);
        warn!(
            "pod {} retrying network setup for {} as {} (attempt {attempt})",
            self.record.pod_id, previous.target, step.request_id
        );
        self.suspend(step.clone());
        Some(step)
    }

    /// Move the pod to `FAILED` and drop any remaining plan.
    pub fn fail(&mut self, reason: impl Into<String>) -> StepOutcome {
        let reason = reason.into();
        self.plan.clear();
        self.pending = None;
        self.record.outstanding_requests.clear();
        match validate_transition(self.record.current_status, PodStatus::Failed) {
            Ok(()) => {
                warn!(
                    "pod {} failed at {}: {reason}",
                    self.record.pod_id, self.record.current_status
                );
                self.record.current_status = PodStatus::Failed;
                self.record.history.push(PodStatus::Failed);
            }
            Err(_) => {
                warn!(
                    "pod {} already terminal at {}, recording error only: {reason}",
                    self.record.pod_id, self.record.current_status
                );
            }
        }
        self.record.last_error = Some(reason.clone());
        self.record.touch();
        StepOutcome::Failed(reason)
    }

    fn enter(&mut self, target: PodStatus) -> Result<(), CoreError> {
        validate_transition(self.record.current_status, target)?;
        debug!(
            "pod {} {} -> {target}",
            self.record.pod_id, self.record.current_status
        );
        self.record.current_status = target;
        self.record.history.push(target);
        self.record.touch();
        Ok(())
    }

    fn suspend(&mut self, step: NetworkStep) {
        debug!(
            "pod {} suspended at {} awaiting {} for {}",
            self.record.pod_id, self.record.current_status, step.request_id, step.target
        );
        self.record
            .outstanding_requests
            .insert(step.request_id.clone());
        self.record.touch();
        self.pending = Some(step);
    }

    fn request_id_for(&self, target: PodStatus, attempt: u32) -> RequestId {
        RequestId::new(format!(
            "{}-g{}-s{}-a{attempt}",
            self.record.pod_id,
            self.record.generation,
            target.as_i32()
        ))
    }
}
