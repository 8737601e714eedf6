use crate::status::PodStatus;
use crate::types::ScenarioName;
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const SCENARIO_FORMAT_VERSION: u32 = 1;

/// On-disk scenario file, version 1.
///
/// ```toml
/// scenario_version = 1
///
/// [[scenario]]
/// name = "boot"
///
/// [[scenario.step]]
/// target = "INIT"
///
/// [[scenario.step]]
/// target = "READY"
/// network = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFileV1 {
    pub scenario_version: u32,
    #[serde(default, rename = "scenario")]
    pub scenarios: Vec<ScenarioDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDefinition {
    pub name: ScenarioName,
    #[serde(default, rename = "step")]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioStep {
    pub target: PodStatus,
    /// The step completes only after a network setup round trip.
    #[serde(default)]
    pub network: bool,
}

impl ScenarioStep {
    pub fn local(target: PodStatus) -> Self {
        Self {
            target,
            network: false,
        }
    }

    pub fn networked(target: PodStatus) -> Self {
        Self {
            target,
            network: true,
        }
    }
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<ScenarioName>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Desired state the scenario drives a pod toward.
    pub fn final_target(&self) -> Option<PodStatus> {
        self.steps.last().map(|s| s.target)
    }

    pub fn step_for(&self, target: PodStatus) -> Option<&ScenarioStep> {
        self.steps.iter().find(|s| s.target == target)
    }

    /// Whether entering `target` needs a network setup round trip.
    /// States the scenario does not list are entered locally.
    pub fn requires_network(&self, target: PodStatus) -> bool {
        self.step_for(target).is_some_and(|s| s.network)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_scenario_name(&self.name)?;
        if self.steps.is_empty() {
            return Err(SchemaError::EmptyScenario(self.name.to_string()));
        }

        let mut previous: Option<(PodStatus, u8)> = None;
        for step in &self.steps {
            let position = match step.target {
                PodStatus::Init | PodStatus::Ready | PodStatus::Running | PodStatus::Done => {
                    step.target.path_position()
                }
                PodStatus::None | PodStatus::Failed | PodStatus::Unknown => None,
            };
            let Some(position) = position else {
                return Err(SchemaError::InvalidStepTarget {
                    scenario: self.name.to_string(),
                    target: step.target,
                });
            };
            if let Some((prev_status, prev_pos)) = previous {
                if position <= prev_pos {
                    return Err(SchemaError::StepOrder {
                        scenario: self.name.to_string(),
                        from: prev_status,
                        to: step.target,
                    });
                }
            }
            previous = Some((step.target, position));
        }
        Ok(())
    }
}

pub fn validate_scenario_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 64 {
        return Err(SchemaError::InvalidScenarioName(
            "scenario name must be 1-64 characters".to_owned(),
        ));
    }
    if name.starts_with('.')
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(SchemaError::InvalidScenarioName(format!(
            "scenario name '{name}' must match [a-zA-Z0-9_.-] and not start with '.'"
        )));
    }
    Ok(())
}

/// Parse and validate every scenario in a version 1 scenario file.
pub fn parse_scenarios_str(input: &str) -> Result<Vec<ScenarioDefinition>, SchemaError> {
    let file: ScenarioFileV1 = toml::from_str(input)?;
    if file.scenario_version != SCENARIO_FORMAT_VERSION {
        return Err(SchemaError::UnsupportedVersion(file.scenario_version));
    }

    let mut seen = HashSet::new();
    for scenario in &file.scenarios {
        scenario.validate()?;
        if !seen.insert(scenario.name.clone()) {
            return Err(SchemaError::DuplicateScenario(scenario.name.to_string()));
        }
    }
    Ok(file.scenarios)
}

pub fn parse_scenarios_file(path: impl AsRef<Path>) -> Result<Vec<ScenarioDefinition>, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_scenarios_str(&content)
}
