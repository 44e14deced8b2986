use std::time::Duration;

/// Immutable configuration for a workflow run, validated once at
/// construction rather than mutated through a builder over the run's
/// lifetime.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub max_turns: u32,
    pub stall_threshold: u32,
    pub max_replans: u32,
    pub default_step_timeout: Duration,
    pub default_step_retries: u32,
    pub max_steps: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_turns: 15,
            stall_threshold: 3,
            max_replans: 2,
            default_step_timeout: Duration::from_secs(60),
            default_step_retries: 2,
            max_steps: 50,
        }
    }
}

impl WorkflowConfig {
    /// Validates the configuration, rejecting values that would make the
    /// orchestrators' guards unsatisfiable (e.g. a threshold of zero would
    /// trip on the very first turn).
    pub fn validate(self) -> Result<Self, String> {
        if self.max_turns == 0 {
            return Err("max_turns must be at least 1".into());
        }
        if self.stall_threshold == 0 {
            return Err("stall_threshold must be at least 1".into());
        }
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".into());
        }
        Ok(self)
    }
}
