use crate::wire::StatusReply;
use kestrel_core::{CoreError, ErrorKind, GcReport, ReconcileOutcome, ScenarioDispatcher};
use kestrel_schema::{NetworkStatus, PodStatus};
use kestrel_store::PodRecord;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

pub const STATUS_OK: i32 = 0;

/// Wire status code for each error class.
pub fn status_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => 1,
        ErrorKind::InvalidTransition => 2,
        ErrorKind::InvalidArgument => 3,
        ErrorKind::Busy => 4,
        ErrorKind::Timeout => 5,
        ErrorKind::Internal => 6,
    }
}

pub fn error_reply(error: &CoreError) -> StatusReply {
    StatusReply {
        status: status_code(error.kind()),
        desc: error.to_string(),
    }
}

pub fn outcome_reply(result: Result<ReconcileOutcome, CoreError>) -> StatusReply {
    match result {
        Ok(ReconcileOutcome::Completed { pod_id, status }) => StatusReply {
            status: STATUS_OK,
            desc: format!("pod '{pod_id}' is {status}"),
        },
        Ok(ReconcileOutcome::InProgress {
            pod_id,
            status,
            request_id,
        }) => StatusReply {
            status: STATUS_OK,
            desc: format!("pod '{pod_id}' is {status}, awaiting network setup {request_id}"),
        },
        Err(e) => error_reply(&e),
    }
}

/// Translates boundary calls into dispatcher operations.
///
/// Runs on blocking server threads and enters the dispatcher's runtime
/// through `handle`; it must not be called from inside that runtime.
pub struct BoundaryAdapter {
    dispatcher: Arc<ScenarioDispatcher>,
    handle: Handle,
}

impl BoundaryAdapter {
    pub fn new(dispatcher: Arc<ScenarioDispatcher>, handle: Handle) -> Self {
        Self { dispatcher, handle }
    }

    pub fn dispatcher(&self) -> &Arc<ScenarioDispatcher> {
        &self.dispatcher
    }

    pub fn trigger_action(&self, scenario_name: &str) -> StatusReply {
        let reply = outcome_reply(
            self.handle
                .block_on(self.dispatcher.trigger_action(scenario_name)),
        );
        info!(
            "TriggerAction({scenario_name}) -> {}: {}",
            reply.status, reply.desc
        );
        reply
    }

    pub fn reconcile(&self, scenario_name: &str, current: i32, desired: i32) -> StatusReply {
        let statuses = PodStatus::try_from(current)
            .and_then(|current| PodStatus::try_from(desired).map(|desired| (current, desired)));
        let reply = match statuses {
            Ok((current, desired)) => outcome_reply(self.handle.block_on(
                self.dispatcher.reconcile(scenario_name, current, desired),
            )),
            Err(e) => error_reply(&CoreError::from(e)),
        };
        info!(
            "Reconcile({scenario_name}, {current}, {desired}) -> {}: {}",
            reply.status, reply.desc
        );
        reply
    }

    pub fn complete_network_setting(
        &self,
        request_id: &str,
        network_status: i32,
        pod_status: i32,
        details: &str,
    ) -> bool {
        let (Ok(network_status), Ok(pod_status)) = (
            NetworkStatus::try_from(network_status),
            PodStatus::try_from(pod_status),
        ) else {
            warn!(
                "CompleteNetworkSetting({request_id}) rejected: statuses {network_status}/{pod_status} out of range"
            );
            return false;
        };
        let acknowledged = self.handle.block_on(self.dispatcher.complete_network_setting(
            request_id,
            network_status,
            pod_status,
            details,
        ));
        debug!(
            "CompleteNetworkSetting({request_id}, {network_status}, {pod_status}) -> {acknowledged}"
        );
        acknowledged
    }

    pub fn pods(&self) -> Vec<PodRecord> {
        self.dispatcher.list()
    }

    pub fn pod(&self, pod_id: &str) -> Option<PodRecord> {
        self.handle.block_on(self.dispatcher.inspect(pod_id))
    }

    pub fn collect_garbage(&self) -> Result<GcReport, CoreError> {
        self.handle.block_on(self.dispatcher.collect_garbage())
    }
}
