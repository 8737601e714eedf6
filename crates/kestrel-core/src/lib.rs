//! Core reconciliation machinery for Kestrel pod lifecycles.
//!
//! This crate ties the schema and store layers into the `ScenarioDispatcher`,
//! the entry point that resolves scenarios to pods and routes every request to
//! a per-pod actor. Each actor owns a `ReconciliationEngine` that walks the
//! lifecycle graph one edge at a time, suspending on steps that need a network
//! round trip. The `NetworkTracker` correlates asynchronous completion reports
//! (or synthesized deadline timeouts) back to the suspended step exactly once.

pub mod actor;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod lifecycle;
pub mod provisioner;
pub mod signal;
pub mod tracker;

pub use config::{EngineConfig, TerminalPolicy};
pub use dispatcher::{GcReport, RecoveryReport, ScenarioDispatcher};
pub use engine::{NetworkReport, NetworkStep, ReconcileOutcome, ReconciliationEngine, StepOutcome};
pub use lifecycle::{plan_path, validate_desired, validate_transition};
pub use provisioner::{
    LoggingProvisioner, NetworkProvisioner, NetworkSetupRequest, ProvisionError,
    RecordingProvisioner,
};
pub use signal::{install_signal_handler, shutdown_requested};
pub use tracker::NetworkTracker;

use kestrel_schema::PodStatus;
use thiserror::Error;

/// Failure classes surfaced at the boundary. Every [`CoreError`] maps to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    InvalidArgument,
    Busy,
    Timeout,
    Internal,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: PodStatus, to: PodStatus },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("pod '{pod_id}' is busy: awaiting network setup {request_id}")]
    Busy { pod_id: String, request_id: String },
    #[error("network setup {request_id} timed out after {attempts} attempt(s)")]
    NetworkTimeout { request_id: String, attempts: u32 },
    #[error("network setup {request_id} confirmed {reported}, expected {expected}")]
    ConfirmationMismatch {
        request_id: String,
        expected: PodStatus,
        reported: PodStatus,
    },
    #[error("pod '{pod_id}' failed: {reason}")]
    PodFailed { pod_id: String, reason: String },
    #[error("no suspended step awaits request {0}")]
    StaleReport(String),
    #[error("request id {0} is already outstanding")]
    DuplicateRequest(String),
    #[error("pod actor for '{0}' is unavailable")]
    ActorUnavailable(String),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("network provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
    #[error("store error: {0}")]
    Store(#[from] kestrel_store::StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] kestrel_schema::SchemaError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ScenarioNotFound(_) => ErrorKind::NotFound,
            Self::InvalidTransition { .. } | Self::ConfirmationMismatch { .. } => {
                ErrorKind::InvalidTransition
            }
            Self::InvalidArgument(_) | Self::Schema(_) | Self::Config(_) => {
                ErrorKind::InvalidArgument
            }
            Self::Busy { .. } => ErrorKind::Busy,
            Self::NetworkTimeout { .. } => ErrorKind::Timeout,
            Self::PodFailed { .. }
            | Self::StaleReport(_)
            | Self::DuplicateRequest(_)
            | Self::ActorUnavailable(_)
            | Self::Provision(_)
            | Self::Store(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_error_display_invalid_transition() {
        let e = CoreError::InvalidTransition {
            from: PodStatus::Running,
            to: PodStatus::Init,
        };
        assert_eq!(e.to_string(), "invalid state transition: RUNNING -> INIT");
    }

    #[test]
    fn core_error_display_busy_names_request() {
        let e = CoreError::Busy {
            pod_id: "boot".to_owned(),
            request_id: "boot-g1-s2-a0".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("boot"));
        assert!(msg.contains("boot-g1-s2-a0"));
    }

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(
            CoreError::ScenarioNotFound("x".to_owned()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::InvalidArgument("x".to_owned()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            CoreError::NetworkTimeout {
                request_id: "r".to_owned(),
                attempts: 1
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            CoreError::DuplicateRequest("r".to_owned()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            CoreError::Schema(kestrel_schema::SchemaError::OutOfRange {
                enumeration: "PodStatus",
                value: 42
            })
            .kind(),
            ErrorKind::InvalidArgument
        );
    }
}
