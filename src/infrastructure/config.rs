//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker-pool size for parallel groups.
    ///
    /// `None` sizes the pool to the definition's largest declared
    /// parallel fan-out.
    pub max_parallel: Option<usize>,

    /// Default per-step timeout in seconds when a leaf declares none
    pub default_step_timeout_secs: u64,

    /// Captured output limit per stream, in bytes; overflow is truncated
    /// with a marker rather than blocking the step
    pub output_limit_bytes: usize,

    /// Shell used to run step commands
    pub shell: String,

    /// Whether a quality-gate timeout aborts the whole run instead of
    /// failing just the gate stage
    pub gate_timeout_escalates: bool,

    /// Whether a quality-gate fail verdict also aborts the whole run;
    /// by default it is an ordinary stage failure
    pub gate_fail_escalates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            default_step_timeout_secs: 3600,
            output_limit_bytes: 1024 * 1024,
            shell: "sh".to_string(),
            gate_timeout_escalates: true,
            gate_fail_escalates: false,
        }
    }
}

impl EngineConfig {
    /// Default per-step timeout as a duration
    #[must_use]
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_secs(self.default_step_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.shell, "sh");
        assert!(config.gate_timeout_escalates);
        assert!(!config.gate_fail_escalates);
        assert_eq!(config.default_step_timeout(), Duration::from_secs(3600));
    }
}
