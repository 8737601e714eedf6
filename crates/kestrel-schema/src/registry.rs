use crate::scenario::{parse_scenarios_file, parse_scenarios_str, ScenarioDefinition};
use crate::types::ScenarioName;
use crate::SchemaError;
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only lookup of scenario definitions by name.
pub trait ScenarioRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ScenarioDefinition>;

    fn names(&self) -> Vec<ScenarioName>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinScenario {
    pub name: &'static str,
    pub description: &'static str,
    pub definition: &'static str,
}

pub const BUILTIN_SCENARIOS: &[BuiltinScenario] = &[
    BuiltinScenario {
        name: "boot",
        description: "Bring a pod up to RUNNING, attaching its network before READY",
        definition: r#"scenario_version = 1

[[scenario]]
name = "boot"

[[scenario.step]]
target = "INIT"

[[scenario.step]]
target = "READY"
network = true

[[scenario.step]]
target = "RUNNING"
"#,
    },
    BuiltinScenario {
        name: "launch",
        description: "Bring a pod up to RUNNING, attaching its network on start",
        definition: r#"scenario_version = 1

[[scenario]]
name = "launch"

[[scenario.step]]
target = "INIT"

[[scenario.step]]
target = "READY"

[[scenario.step]]
target = "RUNNING"
network = true
"#,
    },
    BuiltinScenario {
        name: "oneshot",
        description: "Run a pod to completion",
        definition: r#"scenario_version = 1

[[scenario]]
name = "oneshot"

[[scenario.step]]
target = "INIT"

[[scenario.step]]
target = "READY"
network = true

[[scenario.step]]
target = "RUNNING"

[[scenario.step]]
target = "DONE"
"#,
    },
];

/// Immutable in-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    scenarios: BTreeMap<ScenarioName, ScenarioDefinition>,
}

impl StaticRegistry {
    pub fn new(definitions: Vec<ScenarioDefinition>) -> Result<Self, SchemaError> {
        let mut registry = Self::default();
        registry.extend(definitions)?;
        Ok(registry)
    }

    pub fn builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::default();
        for builtin in BUILTIN_SCENARIOS {
            registry.extend(parse_scenarios_str(builtin.definition)?)?;
        }
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        Self::new(parse_scenarios_file(path)?)
    }

    /// Built-in scenarios overlaid with the ones from `path`. File entries
    /// replace built-ins of the same name.
    pub fn builtin_with_file(path: &Path) -> Result<Self, SchemaError> {
        let mut registry = Self::builtin()?;
        for def in parse_scenarios_file(path)? {
            registry.scenarios.insert(def.name.clone(), def);
        }
        Ok(registry)
    }

    fn extend(&mut self, definitions: Vec<ScenarioDefinition>) -> Result<(), SchemaError> {
        for def in definitions {
            def.validate()?;
            if self.scenarios.contains_key(&def.name) {
                return Err(SchemaError::DuplicateScenario(def.name.to_string()));
            }
            self.scenarios.insert(def.name.clone(), def);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl ScenarioRegistry for StaticRegistry {
    fn lookup(&self, name: &str) -> Option<ScenarioDefinition> {
        self.scenarios.get(name).cloned()
    }

    fn names(&self) -> Vec<ScenarioName> {
        self.scenarios.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioStep;
    use crate::status::PodStatus;

    #[test]
    fn all_builtins_parse() {
        for builtin in BUILTIN_SCENARIOS {
            let result = parse_scenarios_str(builtin.definition);
            assert!(
                result.is_ok(),
                "builtin '{}' failed to parse: {:?}",
                builtin.name,
                result.err()
            );
            assert_eq!(result.unwrap()[0].name.as_str(), builtin.name);
        }
    }

    #[test]
    fn builtin_boot_matches_reference_shape() {
        let registry = StaticRegistry::builtin().unwrap();
        let boot = registry.lookup("boot").unwrap();
        assert_eq!(
            boot.steps,
            vec![
                ScenarioStep::local(PodStatus::Init),
                ScenarioStep::networked(PodStatus::Ready),
                ScenarioStep::local(PodStatus::Running),
            ]
        );
    }

    #[test]
    fn lookup_unknown_is_none() {
        let registry = StaticRegistry::builtin().unwrap();
        assert!(registry.lookup("nonexistent").is_none());
        assert_eq!(registry.len(), BUILTIN_SCENARIOS.len());
    }

    #[test]
    fn new_rejects_invalid_definition() {
        let bad = ScenarioDefinition::new("bad", vec![ScenarioStep::local(PodStatus::Unknown)]);
        assert!(StaticRegistry::new(vec![bad]).is_err());
    }

    #[test]
    fn new_rejects_duplicates() {
        let a = ScenarioDefinition::new("dup", vec![ScenarioStep::local(PodStatus::Init)]);
        assert!(StaticRegistry::new(vec![a.clone(), a]).is_err());
    }

    #[test]
    fn file_entries_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.toml");
        std::fs::write(
            &path,
            r#"scenario_version = 1

[[scenario]]
name = "boot"

[[scenario.step]]
target = "RUNNING"
network = true

[[scenario]]
name = "diagnostics"

[[scenario.step]]
target = "DONE"
"#,
        )
        .unwrap();

        let registry = StaticRegistry::builtin_with_file(&path).unwrap();
        let boot = registry.lookup("boot").unwrap();
        assert_eq!(boot.steps.len(), 1);
        assert!(registry.lookup("diagnostics").is_some());
        assert!(registry.lookup("launch").is_some());
    }

    #[test]
    fn names_are_sorted() {
        let registry = StaticRegistry::builtin().unwrap();
        let names: Vec<String> = registry.names().into_iter().map(ScenarioName::into_inner).collect();
        assert_eq!(names, vec!["boot", "launch", "oneshot"]);
    }
}
