use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Environment switches
// ---------------------------------------------------------------------------

pub const ENV_NO_AUTO: &str = "LIBDEPLOY_NO_AUTO";
pub const ENV_NO_DEPLOY_LIBS: &str = "LIBDEPLOY_NO_DEPLOY_LIBS";
pub const ENV_NO_DEPLOY_SHARED_LIB: &str = "LIBDEPLOY_NO_DEPLOY_SHARED_LIB";
pub const ENV_VERBOSE: &str = "LIBDEPLOY_VERBOSE";

/// Upper bound on a single introspection tool run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

const TRUTHY_VALUES: &[&str] = &["1", "true", "yes"];

fn is_truthy(value: Option<String>) -> bool {
    value.is_some_and(|v| TRUTHY_VALUES.contains(&v.trim().to_ascii_lowercase().as_str()))
}

// ---------------------------------------------------------------------------
// DeployConfig
// ---------------------------------------------------------------------------

/// Switches read once at the entry point and passed down as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_enabled")]
    pub deploy_shared_libs: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            deploy_shared_libs: default_enabled(),
            verbose: false,
        }
    }
}

impl DeployConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let all_off = is_truthy(lookup(ENV_NO_AUTO));
        Self {
            enabled: !all_off && !is_truthy(lookup(ENV_NO_DEPLOY_LIBS)),
            deploy_shared_libs: !all_off && !is_truthy(lookup(ENV_NO_DEPLOY_SHARED_LIB)),
            verbose: is_truthy(lookup(ENV_VERBOSE)),
        }
    }
}
