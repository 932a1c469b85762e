//! Engine configuration
//!
//! [`EngineConfig`] bundles the recognized run options. Values come from, in
//! increasing precedence:
//!
//! 1. [`EngineConfig::default`]
//! 2. a YAML document ([`EngineConfig::from_yaml_str`] / [`EngineConfig::from_file`])
//! 3. `TASKGRAPH_*` environment variables ([`EngineConfig::apply_env`])
//! 4. builder calls (`with_*`)
//!
//! # YAML
//!
//! ```yaml
//! max_steps: 50
//! per_node_timeout_ms: 30000
//! default_retry_budget: 1
//! retry_budget:
//!   action_executor: 3
//! checkpoint_every: every_step
//! retry_policy:
//!   initial_interval: 0.2
//!   jitter: false
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TASKGRAPH_MAX_STEPS` | `max_steps` |
//! | `TASKGRAPH_NODE_TIMEOUT_MS` | `per_node_timeout` |
//! | `TASKGRAPH_CHECKPOINT_EVERY` | `checkpoint_every` |
//! | `TASKGRAPH_DEFAULT_RETRY_BUDGET` | `default_retry_budget` |
//! | `TASKGRAPH_REQUIRE_CHECKPOINTS` | `require_checkpoints` |

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding `max_steps`
pub const ENV_MAX_STEPS: &str = "TASKGRAPH_MAX_STEPS";
/// Environment variable overriding `per_node_timeout` (milliseconds)
pub const ENV_NODE_TIMEOUT_MS: &str = "TASKGRAPH_NODE_TIMEOUT_MS";
/// Environment variable overriding `checkpoint_every`
pub const ENV_CHECKPOINT_EVERY: &str = "TASKGRAPH_CHECKPOINT_EVERY";
/// Environment variable overriding `default_retry_budget`
pub const ENV_DEFAULT_RETRY_BUDGET: &str = "TASKGRAPH_DEFAULT_RETRY_BUDGET";
/// Environment variable overriding `require_checkpoints`
pub const ENV_REQUIRE_CHECKPOINTS: &str = "TASKGRAPH_REQUIRE_CHECKPOINTS";

/// When the engine offers the run context to the checkpoint store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// After the initial step, every successful step, and at the end
    #[default]
    #[serde(alias = "everyStep")]
    EveryStep,
    /// Never
    Never,
}

impl FromStr for CheckpointPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "everyStep" | "every_step" | "every-step" => Ok(Self::EveryStep),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown checkpoint policy '{other}'")),
        }
    }
}

impl fmt::Display for CheckpointPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EveryStep => f.write_str("every_step"),
            Self::Never => f.write_str("never"),
        }
    }
}

/// Options recognized by the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on successful steps per run
    pub max_steps: usize,

    /// Bound on a single node invocation; `None` disables it
    #[serde(rename = "per_node_timeout_ms", with = "opt_millis")]
    pub per_node_timeout: Option<Duration>,

    /// Maximum retries per node name
    pub retry_budget: HashMap<String, u32>,

    /// Retries for nodes absent from `retry_budget`
    pub default_retry_budget: u32,

    /// Checkpoint frequency
    pub checkpoint_every: CheckpointPolicy,

    /// Extra attempts for a failed checkpoint write
    pub checkpoint_retries: u32,

    /// Fail the run when a checkpoint cannot be written
    pub require_checkpoints: bool,

    /// Spacing between node retries
    pub retry_policy: RetryPolicy,

    /// Buffer size of the run event channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            per_node_timeout: Some(Duration::from_secs(120)),
            retry_budget: HashMap::new(),
            default_retry_budget: 0,
            checkpoint_every: CheckpointPolicy::EveryStep,
            checkpoint_retries: 3,
            require_checkpoints: false,
            retry_policy: RetryPolicy::default(),
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step limit
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set or clear the per-node timeout
    pub fn with_node_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.per_node_timeout = timeout;
        self
    }

    /// Set the retry budget of one node
    pub fn with_retry_budget(mut self, node: impl Into<String>, retries: u32) -> Self {
        self.retry_budget.insert(node.into(), retries);
        self
    }

    /// Set the retry budget for nodes without an explicit entry
    pub fn with_default_retry_budget(mut self, retries: u32) -> Self {
        self.default_retry_budget = retries;
        self
    }

    /// Set the checkpoint frequency
    pub fn with_checkpoint_every(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_every = policy;
        self
    }

    /// Set how often a failed checkpoint write is retried
    pub fn with_checkpoint_retries(mut self, retries: u32) -> Self {
        self.checkpoint_retries = retries;
        self
    }

    /// Make checkpoint failures fatal for the run
    pub fn with_required_checkpoints(mut self, required: bool) -> Self {
        self.require_checkpoints = required;
        self
    }

    /// Set the retry backoff
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Retries allowed for `node`
    pub fn retries_for(&self, node: &str) -> u32 {
        self.retry_budget
            .get(node)
            .copied()
            .unwrap_or(self.default_retry_budget)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        if self.per_node_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "per_node_timeout must be positive (set it to null to disable)".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be at least 1".into(),
            ));
        }
        if !self.retry_policy.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "retry_policy has unusable intervals: {:?}",
                self.retry_policy
            )));
        }
        Ok(())
    }

    /// Parse a YAML document; missing fields keep their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Defaults overridden by `TASKGRAPH_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Apply `TASKGRAPH_*` environment variables on top of `self`
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    ///
    /// `lookup` returns the raw value of a variable, or `None` when unset.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(max_steps) = parse_var::<usize>(&lookup, ENV_MAX_STEPS)? {
            self.max_steps = max_steps;
        }
        if let Some(millis) = parse_var::<u64>(&lookup, ENV_NODE_TIMEOUT_MS)? {
            self.per_node_timeout = Some(Duration::from_millis(millis));
        }
        if let Some(policy) = parse_var::<CheckpointPolicy>(&lookup, ENV_CHECKPOINT_EVERY)? {
            self.checkpoint_every = policy;
        }
        if let Some(budget) = parse_var::<u32>(&lookup, ENV_DEFAULT_RETRY_BUDGET)? {
            self.default_retry_budget = budget;
        }
        if let Some(required) = parse_bool(&lookup, ENV_REQUIRE_CHECKPOINTS)? {
            self.require_checkpoints = required;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Env {
                key: key.to_string(),
                value: raw,
            }),
        },
        None => Ok(None),
    }
}

/// `Option<Duration>` as optional whole milliseconds
mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
