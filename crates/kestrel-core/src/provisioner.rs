use kestrel_schema::{PodId, PodStatus, RequestId, ScenarioName};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::info;

/// What the engine hands to the network subsystem when a step suspends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSetupRequest {
    pub request_id: RequestId,
    pub pod_id: PodId,
    pub scenario_name: ScenarioName,
    /// State the pod enters once setup is confirmed.
    pub target: PodStatus,
    pub attempt: u32,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("network subsystem rejected request {request_id}: {reason}")]
    Rejected { request_id: String, reason: String },
    #[error("network subsystem unreachable: {0}")]
    Unreachable(String),
}

/// Outbound seam to the network subsystem.
///
/// `request_setup` only hands the request off; the outcome arrives later
/// through a completion report. It is called from inside a pod actor and
/// must not block on the round trip.
pub trait NetworkProvisioner: Send + Sync {
    fn name(&self) -> &str;

    fn request_setup(&self, request: &NetworkSetupRequest) -> Result<(), ProvisionError>;
}

/// Accepts every request and only logs it. Completions are expected to be
/// reported by an operator or an external controller.
pub struct LoggingProvisioner;

impl NetworkProvisioner for LoggingProvisioner {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn request_setup(&self, request: &NetworkSetupRequest) -> Result<(), ProvisionError> {
        info!(
            "network setup requested: {} for pod {} -> {} (attempt {})",
            request.request_id, request.pod_id, request.target, request.attempt
        );
        Ok(())
    }
}

/// Records every request in memory. Used by tests and benchmarks to learn
/// which request ids to complete.
#[derive(Default)]
pub struct RecordingProvisioner {
    requests: Mutex<Vec<NetworkSetupRequest>>,
    failing: bool,
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provisioner that rejects every request.
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn requests(&self) -> Vec<NetworkSetupRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<NetworkSetupRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetworkProvisioner for RecordingProvisioner {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn request_setup(&self, request: &NetworkSetupRequest) -> Result<(), ProvisionError> {
        if self.failing {
            return Err(ProvisionError::Rejected {
                request_id: request.request_id.to_string(),
                reason: "recording provisioner configured to fail".to_owned(),
            });
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> NetworkSetupRequest {
        NetworkSetupRequest {
            request_id: RequestId::new(id),
            pod_id: PodId::new("boot"),
            scenario_name: ScenarioName::new("boot"),
            target: PodStatus::Ready,
            attempt: 0,
        }
    }

    #[test]
    fn recording_keeps_order() {
        let p = RecordingProvisioner::new();
        assert!(p.is_empty());
        p.request_setup(&request("a")).unwrap();
        p.request_setup(&request("b")).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.requests()[0].request_id.as_str(), "a");
        assert_eq!(p.last().unwrap().request_id.as_str(), "b");
    }

    #[test]
    fn failing_rejects_without_recording() {
        let p = RecordingProvisioner::failing();
        let err = p.request_setup(&request("a")).unwrap_err();
        assert!(err.to_string().contains('a'));
        assert!(p.is_empty());
    }

    #[test]
    fn logging_accepts() {
        assert!(LoggingProvisioner.request_setup(&request("a")).is_ok());
        assert_eq!(LoggingProvisioner.name(), "logging");
    }

    #[test]
    fn request_serializes_wire_names() {
        let json = serde_json::to_string(&request("boot-g1-s2-a0")).unwrap();
        assert!(json.contains("\"target\":\"READY\""));
        assert!(json.contains("\"request_id\":\"boot-g1-s2-a0\""));
    }
}
