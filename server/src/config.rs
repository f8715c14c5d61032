use std::collections::BTreeSet;

use anyhow::{Result, bail};
use platform_authz::IamConfig;

/// Grants every permission when present in `IAM_GRANTED_PERMISSIONS`.
pub const WILDCARD: &str = "*";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub iam: IamConfig,
    /// Permissions the demo decision callback grants.
    pub granted_permissions: BTreeSet<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let iam = IamConfig::from_env();
        let granted_permissions =
            parse_permissions(&std::env::var("IAM_GRANTED_PERMISSIONS").unwrap_or_default())?;
        Ok(Self {
            iam,
            granted_permissions,
        })
    }

    pub fn is_granted(&self, permission: &str) -> bool {
        self.granted_permissions.contains(WILDCARD)
            || self.granted_permissions.contains(permission)
    }
}

fn parse_permissions(raw: &str) -> Result<BTreeSet<String>> {
    let mut granted = BTreeSet::new();
    for item in raw.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().any(char::is_whitespace) {
            bail!("invalid permission `{trimmed}` in IAM_GRANTED_PERMISSIONS");
        }
        granted.insert(trimmed.to_string());
    }
    Ok(granted)
}
