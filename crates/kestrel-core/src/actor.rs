//! Per-pod actors.
//!
//! Each pod is driven by one task that owns its `ReconciliationEngine` and
//! drains a bounded mailbox. Triggers, reconciles, completion reports and
//! deadline expiries are all commands on that mailbox, so every event for a
//! pod is applied in arrival order with no locks around the engine.

use crate::config::{EngineConfig, TerminalPolicy};
use crate::engine::{NetworkReport, NetworkStep, ReconcileOutcome, ReconciliationEngine, StepOutcome};
use crate::provisioner::{NetworkProvisioner, NetworkSetupRequest};
use crate::tracker::NetworkTracker;
use crate::CoreError;
use kestrel_schema::{PodId, PodStatus, RequestId, ScenarioDefinition};
use kestrel_store::{PodRecord, PodRecordStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<T>;

pub enum PodCommand {
    Trigger {
        scenario: ScenarioDefinition,
        reply: Reply<Result<ReconcileOutcome, CoreError>>,
    },
    Reconcile {
        scenario: ScenarioDefinition,
        current: PodStatus,
        desired: PodStatus,
        reply: Reply<Result<ReconcileOutcome, CoreError>>,
    },
    NetworkReport {
        request_id: RequestId,
        report: NetworkReport,
    },
    /// The tracker settled the request as timed out.
    NetworkDeadline {
        request_id: RequestId,
    },
    Inspect {
        reply: Reply<PodRecord>,
    },
    /// Stop the actor and drop its record if the generation is retirable.
    Retire {
        reply: Reply<bool>,
    },
}

/// Collaborators shared by every pod actor.
pub(crate) struct ActorContext {
    pub(crate) store: Arc<PodRecordStore>,
    pub(crate) tracker: Arc<NetworkTracker>,
    pub(crate) provisioner: Arc<dyn NetworkProvisioner>,
    pub(crate) config: EngineConfig,
}

/// Sending side of a pod actor's mailbox.
#[derive(Clone)]
pub struct PodHandle {
    pod_id: PodId,
    tx: mpsc::Sender<PodCommand>,
}

impl PodHandle {
    pub(crate) fn spawn(engine: ReconciliationEngine, ctx: Arc<ActorContext>) -> Self {
        let pod_id = engine.record().pod_id.clone();
        let (tx, rx) = mpsc::channel(ctx.config.mailbox_capacity);
        let actor = PodActor {
            engine,
            mailbox: rx,
            self_ref: tx.downgrade(),
            ctx,
            timed_out: None,
        };
        tokio::spawn(actor.run());
        Self { pod_id, tx }
    }

    pub fn pod_id(&self) -> &PodId {
        &self.pod_id
    }

    /// The actor has stopped and will accept no further commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn same_actor(&self, other: &PodHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> PodCommand,
    ) -> Result<T, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| CoreError::ActorUnavailable(self.pod_id.to_string()))?;
        rx.await
            .map_err(|_| CoreError::ActorUnavailable(self.pod_id.to_string()))
    }

    pub async fn trigger(
        &self,
        scenario: ScenarioDefinition,
    ) -> Result<ReconcileOutcome, CoreError> {
        self.request(|reply| PodCommand::Trigger { scenario, reply })
            .await?
    }

    pub async fn reconcile(
        &self,
        scenario: ScenarioDefinition,
        current: PodStatus,
        desired: PodStatus,
    ) -> Result<ReconcileOutcome, CoreError> {
        self.request(|reply| PodCommand::Reconcile {
            scenario,
            current,
            desired,
            reply,
        })
        .await?
    }

    /// Record snapshot after every command queued before this one.
    pub async fn inspect(&self) -> Result<PodRecord, CoreError> {
        self.request(|reply| PodCommand::Inspect { reply }).await
    }

    pub async fn retire(&self) -> Result<bool, CoreError> {
        self.request(|reply| PodCommand::Retire { reply }).await
    }
}

struct PodActor {
    engine: ReconciliationEngine,
    mailbox: mpsc::Receiver<PodCommand>,
    /// Handed to the tracker; weak so requests never keep the actor alive.
    self_ref: mpsc::WeakSender<PodCommand>,
    ctx: Arc<ActorContext>,
    /// Set while the current generation is FAILED by an expired deadline.
    /// Lost when the actor stops.
    timed_out: Option<(String, u32)>,
}

impl PodActor {
    async fn run(mut self) {
        let pod_id = self.engine.record().pod_id.clone();
        debug!("pod actor {pod_id} started at {}", self.engine.record().current_status);

        while let Some(command) = self.mailbox.recv().await {
            match command {
                PodCommand::Trigger { scenario, reply } => {
                    let _ = reply.send(self.trigger(scenario));
                }
                PodCommand::Reconcile {
                    scenario,
                    current,
                    desired,
                    reply,
                } => {
                    let _ = reply.send(self.reconcile(scenario, current, desired));
                }
                PodCommand::NetworkReport { request_id, report } => {
                    self.on_network_report(&request_id, &report);
                }
                PodCommand::NetworkDeadline { request_id } => {
                    self.on_deadline(&request_id);
                }
                PodCommand::Inspect { reply } => {
                    let _ = reply.send(self.engine.record().clone());
                }
                PodCommand::Retire { reply } => {
                    let retired = self.retire();
                    let _ = reply.send(retired);
                    if retired {
                        break;
                    }
                }
            }
        }

        if let Some(step) = self.engine.pending() {
            self.ctx.tracker.cancel(&step.request_id);
        }
        debug!("pod actor {pod_id} stopped");
    }

    fn trigger(&mut self, scenario: ScenarioDefinition) -> Result<ReconcileOutcome, CoreError> {
        let target = scenario.final_target().ok_or_else(|| {
            CoreError::InvalidArgument(format!("scenario '{}' has no steps", scenario.name))
        })?;

        let current = self.engine.record().current_status;
        if current.is_terminal() {
            match self.ctx.config.terminal_policy {
                TerminalPolicy::Reject => {
                    return Err(self.terminal_error(current, target));
                }
                TerminalPolicy::NewGeneration => {
                    self.timed_out = None;
                    self.engine.start_next_generation(scenario);
                }
            }
            self.engine.plan(target)?;
        } else {
            self.engine.plan(target)?;
            self.engine.set_scenario(scenario);
        }

        info!(
            "pod {} triggered toward {target} (generation {})",
            self.engine.record().pod_id,
            self.engine.record().generation
        );
        let outcome = self.engine.advance();
        self.settle(outcome)
    }

    fn reconcile(
        &mut self,
        scenario: ScenarioDefinition,
        current: PodStatus,
        desired: PodStatus,
    ) -> Result<ReconcileOutcome, CoreError> {
        if current == PodStatus::Unknown || desired == PodStatus::Unknown {
            return Err(CoreError::InvalidArgument(
                "UNKNOWN cannot be reconciled".to_owned(),
            ));
        }
        let record = self.engine.record();
        if record.current_status != current {
            return Err(CoreError::InvalidArgument(format!(
                "stale current status {current} for pod '{}', which is {}",
                record.pod_id, record.current_status
            )));
        }
        if current == desired {
            return Ok(ReconcileOutcome::Completed {
                pod_id: record.pod_id.clone(),
                status: current,
            });
        }
        if current == PodStatus::Failed && self.timed_out.is_some() {
            return Err(self.terminal_error(current, desired));
        }

        self.engine.plan(desired)?;
        self.engine.set_scenario(scenario);
        info!(
            "pod {} reconciling {current} -> {desired}",
            self.engine.record().pod_id
        );
        let outcome = self.engine.advance();
        self.settle(outcome)
    }

    fn on_network_report(&mut self, request_id: &RequestId, report: &NetworkReport) {
        match self.engine.apply_network_report(request_id, report) {
            Ok(outcome) => self.settle_async(outcome),
            Err(e) => debug!("pod {}: {e}", self.engine.record().pod_id),
        }
    }

    fn on_deadline(&mut self, request_id: &RequestId) {
        let Some(step) = self
            .engine
            .pending()
            .filter(|step| step.request_id == *request_id)
            .cloned()
        else {
            debug!(
                "pod {}: ignoring deadline for {request_id}",
                self.engine.record().pod_id
            );
            return;
        };

        if step.attempt < self.ctx.config.max_retries {
            if let Some(next) = self.engine.retry(request_id) {
                self.settle_async(StepOutcome::AwaitingNetwork(next));
            }
            return;
        }

        let cause = CoreError::NetworkTimeout {
            request_id: request_id.to_string(),
            attempts: step.attempt + 1,
        };
        let report = NetworkReport::timeout(self.engine.record().current_status, cause.to_string());
        match self.engine.apply_network_report(request_id, &report) {
            Ok(outcome) => {
                self.settle_async(outcome);
                if self.engine.record().current_status == PodStatus::Failed {
                    self.timed_out = Some((request_id.to_string(), step.attempt + 1));
                }
            }
            Err(e) => warn!("pod {}: {e}", self.engine.record().pod_id),
        }
    }

    /// Error for a move out of a terminal status. A generation that failed
    /// on an expired deadline reports the timeout itself.
    fn terminal_error(&self, from: PodStatus, to: PodStatus) -> CoreError {
        match &self.timed_out {
            Some((request_id, attempts)) if from == PodStatus::Failed => {
                CoreError::NetworkTimeout {
                    request_id: request_id.clone(),
                    attempts: *attempts,
                }
            }
            _ => CoreError::InvalidTransition { from, to },
        }
    }

    fn retire(&mut self) -> bool {
        let record = self.engine.record();
        if !record.is_retirable() {
            return false;
        }
        match self.ctx.store.remove(&record.pod_id) {
            Ok(_) => {
                info!(
                    "retired pod {} generation {} at {}",
                    record.pod_id, record.generation, record.current_status
                );
                true
            }
            Err(e) => {
                warn!("failed to retire pod {}: {e}", record.pod_id);
                false
            }
        }
    }

    /// Carry out the side effects of a step outcome and publish the record.
    fn settle(&mut self, outcome: StepOutcome) -> Result<ReconcileOutcome, CoreError> {
        let pod_id = self.engine.record().pod_id.clone();
        match outcome {
            StepOutcome::Settled(status) => {
                self.publish()?;
                Ok(ReconcileOutcome::Completed { pod_id, status })
            }
            StepOutcome::AwaitingNetwork(step) => {
                if let Err(e) = self.start_network_step(&step) {
                    self.engine.fail(e.to_string());
                    self.publish()?;
                    return Err(e);
                }
                self.publish()?;
                Ok(ReconcileOutcome::InProgress {
                    pod_id,
                    status: self.engine.record().current_status,
                    request_id: step.request_id,
                })
            }
            StepOutcome::Failed(reason) => {
                self.publish()?;
                Err(CoreError::PodFailed {
                    pod_id: pod_id.into_inner(),
                    reason,
                })
            }
        }
    }

    /// [`settle`](Self::settle) for events with no caller waiting on a reply.
    fn settle_async(&mut self, outcome: StepOutcome) {
        match self.settle(outcome) {
            Ok(ReconcileOutcome::Completed { pod_id, status }) => {
                info!("pod {pod_id} reached {status}");
            }
            Ok(ReconcileOutcome::InProgress {
                pod_id, request_id, ..
            }) => {
                debug!("pod {pod_id} awaiting {request_id}");
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn start_network_step(&self, step: &NetworkStep) -> Result<(), CoreError> {
        let record = self.engine.record();
        self.ctx.tracker.register(
            step.request_id.clone(),
            record.pod_id.clone(),
            self.self_ref.clone(),
            step.attempt,
        )?;

        let request = NetworkSetupRequest {
            request_id: step.request_id.clone(),
            pod_id: record.pod_id.clone(),
            scenario_name: record.scenario_name.clone(),
            target: step.target,
            attempt: step.attempt,
        };
        if let Err(e) = self.ctx.provisioner.request_setup(&request) {
            self.ctx.tracker.cancel(&step.request_id);
            return Err(e.into());
        }
        Ok(())
    }

    fn publish(&self) -> Result<(), CoreError> {
        self.ctx
            .store
            .publish(self.engine.record().clone())
            .map_err(|e| {
                error!(
                    "failed to publish pod {}: {e}",
                    self.engine.record().pod_id
                );
                CoreError::Store(e)
            })
    }
}
