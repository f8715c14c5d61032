use serde::Deserialize;

use crate::catalog::DEFAULT_RESOURCE_SUFFIX;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IamConfig {
    /// Let requests through when they do not resolve to exactly one permission.
    #[serde(default)]
    pub undefined_policy_authorized: bool,
    /// Initial value of the runtime filtering switch.
    #[serde(default)]
    pub disable_filtering: bool,
    #[serde(default = "default_resource_suffix")]
    pub resource_suffix: String,
}

fn default_resource_suffix() -> String {
    DEFAULT_RESOURCE_SUFFIX.to_string()
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            undefined_policy_authorized: false,
            disable_filtering: false,
            resource_suffix: default_resource_suffix(),
        }
    }
}

impl IamConfig {
    pub fn from_env() -> Self {
        Self {
            undefined_policy_authorized: env_bool("IAM_UNDEFINED_POLICY_AUTHORIZED", false),
            disable_filtering: env_bool("IAM_DISABLE_FILTERING", false),
            resource_suffix: std::env::var("IAM_RESOURCE_SUFFIX")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(default_resource_suffix),
        }
    }
}

fn env_bool(var: &str, default: bool) -> bool {
    std::env::var(var)
        .ok()
        .map(|value| parse_bool(&value))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}
