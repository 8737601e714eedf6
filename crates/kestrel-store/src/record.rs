use kestrel_schema::{PodId, PodStatus, RequestId, ScenarioName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One generation of a tracked workload.
///
/// Pure data: every mutation goes through the reconciliation engine, which
/// publishes a fresh snapshot after each event it processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PodRecord {
    pub pod_id: PodId,
    pub generation: u64,
    pub scenario_name: ScenarioName,
    pub current_status: PodStatus,
    pub desired_status: PodStatus,
    #[serde(default)]
    pub outstanding_requests: BTreeSet<RequestId>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Statuses this generation has held, oldest first.
    #[serde(default)]
    pub history: Vec<PodStatus>,
    pub created_at: String,
    pub updated_at: String,
}

impl PodRecord {
    pub fn new(
        pod_id: PodId,
        scenario_name: ScenarioName,
        generation: u64,
        current_status: PodStatus,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            pod_id,
            generation,
            scenario_name,
            current_status,
            desired_status: current_status,
            outstanding_requests: BTreeSet::new(),
            last_error: None,
            history: vec![current_status],
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The record that supersedes this one when a scenario restarts it.
    pub fn next_generation(&self, scenario_name: ScenarioName) -> Self {
        Self::new(
            self.pod_id.clone(),
            scenario_name,
            self.generation + 1,
            PodStatus::None,
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.current_status.is_terminal()
    }

    /// A step is in flight while any network request is outstanding.
    pub fn is_suspended(&self) -> bool {
        !self.outstanding_requests.is_empty()
    }

    /// Terminal and settled: nothing can mutate this generation any more.
    pub fn is_retirable(&self) -> bool {
        self.is_terminal() && !self.is_suspended()
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
