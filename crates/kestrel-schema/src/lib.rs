//! Status enumerations, identifiers, and scenario definitions for Kestrel.
//!
//! This crate defines the schema layer: the closed `PodStatus` and `NetworkStatus`
//! enumerations with their fixed wire values, string newtypes for pod, scenario and
//! request identifiers, TOML scenario files (`ScenarioFileV1`) with validation, and
//! the `ScenarioRegistry` seam with a static implementation and built-in scenarios.

pub mod registry;
pub mod scenario;
pub mod status;
pub mod types;

pub use registry::{BuiltinScenario, ScenarioRegistry, StaticRegistry, BUILTIN_SCENARIOS};
pub use scenario::{
    parse_scenarios_file, parse_scenarios_str, validate_scenario_name, ScenarioDefinition,
    ScenarioFileV1, ScenarioStep, SCENARIO_FORMAT_VERSION,
};
pub use status::{NetworkStatus, PodStatus};
pub use types::{PodId, RequestId, ScenarioName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scenario file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported scenario_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("invalid scenario name: {0}")]
    InvalidScenarioName(String),
    #[error("scenario '{0}' has no steps")]
    EmptyScenario(String),
    #[error("scenario '{scenario}' cannot target {target}")]
    InvalidStepTarget { scenario: String, target: PodStatus },
    #[error("scenario '{scenario}' steps must move forward: {from} -> {to}")]
    StepOrder {
        scenario: String,
        from: PodStatus,
        to: PodStatus,
    },
    #[error("scenario '{0}' is defined more than once")]
    DuplicateScenario(String),
    #[error("{value} is not a valid {enumeration} value")]
    OutOfRange {
        enumeration: &'static str,
        value: i32,
    },
}
