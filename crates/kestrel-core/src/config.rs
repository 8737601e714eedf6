use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// What a trigger does to a pod whose current generation is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalPolicy {
    /// Start a fresh generation from `NONE`.
    #[default]
    NewGeneration,
    /// Refuse with an invalid-transition error.
    Reject,
}

/// Tunables for the dispatcher and its pod actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deadline for each network setup request.
    pub network_timeout_ms: u64,
    /// Extra attempts after a deadline expires before the pod fails.
    /// Reported ERROR and TIMEOUT outcomes are never retried.
    pub max_retries: u32,
    pub mailbox_capacity: usize,
    pub terminal_policy: TerminalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            max_retries: 0,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            terminal_policy: TerminalPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.network_timeout_ms == 0 {
            return Err(CoreError::Config(
                "network_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(CoreError::Config(
                "mailbox_capacity must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}
