//! JSON bodies of the `/v1` routes.
//!
//! Enumerations travel as their fixed integer values so they round-trip
//! exactly; the adapter converts them and rejects out-of-range values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerActionRequest {
    pub scenario_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileRequest {
    pub scenario_name: String,
    pub current: i32,
    pub desired: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteNetworkSettingRequest {
    pub request_id: String,
    pub network_status: i32,
    pub pod_status: i32,
    #[serde(default)]
    pub details: String,
}

/// Reply to trigger and reconcile calls. `status` is 0 on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: i32,
    pub desc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReply {
    pub acknowledged: bool,
}
