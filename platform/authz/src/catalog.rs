//! Permission catalog derived from the route table.

use std::collections::{BTreeMap, HashMap};

use axum::http::Method;
use serde::Serialize;
use tracing::debug;

use crate::route::HostRouter;
use crate::rules::RuleRegistry;

pub const DEFAULT_RESOURCE_SUFFIX: &str = "_resource";
pub const UNDEFINED_ACTION: &str = "undefined";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionEntry {
    pub name: String,
    pub description: String,
    pub handler_id: String,
}

impl PermissionEntry {
    fn new(name: String, handler_id: String) -> Self {
        let description = describe(&name);
        Self {
            name,
            description,
            handler_id,
        }
    }
}

/// Default action for a method, or `None` for methods that never carry a
/// permission of their own.
pub fn default_action(method: &Method) -> Option<&'static str> {
    match *method {
        Method::HEAD | Method::OPTIONS => None,
        Method::GET => Some("read"),
        Method::POST => Some("create"),
        Method::PATCH | Method::PUT => Some("modify"),
        Method::DELETE => Some("delete"),
        _ => Some(UNDEFINED_ACTION),
    }
}

/// `Allow to <action> <object>` where object is the dotted segment before the action.
pub fn describe(name: &str) -> String {
    let mut parts = name.rsplit('.');
    let action = parts.next().unwrap_or_default();
    let object = parts.next().unwrap_or_default();
    format!("Allow to {action} {object}")
}

/// First two literal segments of a path template, dot-joined. Parameter
/// segments (`{id}`, `<id>`, `:id`, `*rest`) are not part of the name.
pub fn path_levels(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && !is_parameter(segment))
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}

fn is_parameter(segment: &str) -> bool {
    (segment.starts_with('{') && segment.ends_with('}'))
        || (segment.starts_with('<') && segment.ends_with('>'))
        || segment.starts_with(':')
        || segment.starts_with('*')
}

/// Two handlers derived the same permission name; `kept` was inserted last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub name: String,
    pub dropped: String,
    pub kept: String,
}

/// Snapshot of every permission the route table defines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyCatalog {
    entries: Vec<PermissionEntry>,
    by_name: HashMap<String, usize>,
    collisions: Vec<NameCollision>,
}

impl PolicyCatalog {
    pub fn build(router: &dyn HostRouter, rules: &RuleRegistry, resource_suffix: &str) -> Self {
        let mut catalog = Self::default();
        for route in router.routes() {
            if !route.endpoint.ends_with(resource_suffix) {
                continue;
            }
            let levels = path_levels(&route.path);
            for method in &route.methods {
                let Some(default) = default_action(method) else {
                    continue;
                };
                let Some(handler_id) = router.handler_id(&route.endpoint, method) else {
                    continue;
                };
                let action = rules
                    .find(&handler_id)
                    .and_then(|rule| rule.options.action_name())
                    .unwrap_or(default);
                catalog.insert(PermissionEntry::new(format!("{levels}.{action}"), handler_id));
            }
        }
        catalog
    }

    /// Insert or overwrite by name. An overwritten entry keeps its position.
    fn insert(&mut self, entry: PermissionEntry) {
        match self.by_name.get(&entry.name) {
            Some(&index) => {
                let previous = &self.entries[index];
                if previous.handler_id != entry.handler_id {
                    debug!(
                        permission = %entry.name,
                        dropped = %previous.handler_id,
                        kept = %entry.handler_id,
                        "permission name overwritten"
                    );
                    self.collisions.push(NameCollision {
                        name: entry.name.clone(),
                        dropped: previous.handler_id.clone(),
                        kept: entry.handler_id.clone(),
                    });
                }
                self.entries[index] = entry;
            }
            None => {
                self.by_name.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PermissionEntry> {
        self.entries
    }

    pub fn get(&self, name: &str) -> Option<&PermissionEntry> {
        self.by_name.get(name).map(|&index| &self.entries[index])
    }

    /// All entries served by `handler_id`. More than one means the catalog is
    /// ambiguous for that handler.
    pub fn for_handler(&self, handler_id: &str) -> Vec<&PermissionEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.handler_id == handler_id)
            .collect()
    }

    /// `name -> description`, sorted by name.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), entry.description.clone()))
            .collect()
    }

    /// Names that more than one handler derived, in insertion order.
    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
