//! Per-handler overrides registered while the application is wired up.

use std::collections::BTreeMap;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::route::HandlerRef;

/// The only option key the catalog builder reads.
pub const ACTION_OPTION: &str = "action";

/// Free-form options attached to a rule; keys other than `action` are kept
/// for the embedding application.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RuleOptions(BTreeMap<String, String>);

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(self, action: impl Into<String>) -> Self {
        self.with(ACTION_OPTION, action)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn action_name(&self) -> Option<&str> {
        self.get(ACTION_OPTION)
    }
}

impl<K, V> FromIterator<(K, V)> for RuleOptions
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleOverride {
    pub handler_id: String,
    pub declaring_module: String,
    pub options: RuleOptions,
}

/// Append-only list of overrides. Duplicates are kept; lookups return the
/// earliest registration.
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<RuleOverride>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        handler_id: impl Into<String>,
        declaring_module: impl Into<String>,
        options: RuleOptions,
    ) -> &mut Self {
        let rule = RuleOverride {
            handler_id: handler_id.into(),
            declaring_module: declaring_module.into(),
            options,
        };
        tracing::debug!(handler = %rule.handler_id, module = %rule.declaring_module, "iam rule registered");
        self.rules.push(rule);
        self
    }

    /// Register an override for `handler` serving `method`.
    pub fn rule(&mut self, handler: &HandlerRef, method: &Method, options: RuleOptions) -> &mut Self {
        self.add(handler.handler_id(method), handler.module(), options)
    }

    pub fn find(&self, handler_id: &str) -> Option<&RuleOverride> {
        self.rules.iter().find(|rule| rule.handler_id == handler_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
