//! The seam between the policy layer and the host router.

use std::any::type_name;

use axum::http::Method;

use crate::error::RouteMatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// A free-standing handler function.
    Function,
    /// A type grouping one handler per HTTP method.
    Resource,
}

/// Identity of the code serving an endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerRef {
    module: String,
    name: String,
    kind: HandlerKind,
}

impl HandlerRef {
    /// Identity of a handler function, taken from its item path. An
    /// associated function keeps its owner (`UsersResource::get` becomes
    /// `UsersResource.get`). Closures have no usable item path; name them with
    /// [`HandlerRef::named`].
    pub fn function<F>(_handler: &F) -> Self {
        Self::from_type_name(type_name::<F>(), HandlerKind::Function)
    }

    /// Identity of a resource type whose methods serve the route.
    pub fn resource<R: ?Sized>() -> Self {
        Self::from_type_name(type_name::<R>(), HandlerKind::Resource)
    }

    pub fn named(module: impl Into<String>, name: impl Into<String>, kind: HandlerKind) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            kind,
        }
    }

    fn from_type_name(full: &str, kind: HandlerKind) -> Self {
        // Generic arguments may contain `::` themselves.
        let head = full.split('<').next().unwrap_or(full);
        let Some((module, _)) = head.rsplit_once("::") else {
            return Self::named("", full, kind);
        };
        let name = &full[module.len() + 2..];
        if kind == HandlerKind::Function {
            if let Some((outer, owner)) = module.rsplit_once("::") {
                if owner.starts_with(|c: char| c.is_ascii_uppercase()) {
                    return Self::named(outer, format!("{owner}.{name}"), kind);
                }
            }
        }
        Self::named(module, name, kind)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Type name for resources, function name otherwise.
    pub fn qualified_name(&self) -> &str {
        &self.name
    }

    /// `<qualified name>.<lowercased method>`, the key shared by the rule
    /// registry, the catalog and the interceptor.
    pub fn handler_id(&self, method: &Method) -> String {
        format!(
            "{}.{}",
            self.qualified_name(),
            method.as_str().to_ascii_lowercase()
        )
    }
}

/// A route as the host router declares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub endpoint: String,
    pub path: String,
    pub methods: Vec<Method>,
}

impl RouteDescriptor {
    pub fn new(
        endpoint: impl Into<String>,
        path: impl Into<String>,
        methods: impl IntoIterator<Item = Method>,
    ) -> Self {
        let mut unique: Vec<Method> = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }
        Self {
            endpoint: endpoint.into(),
            path: path.into(),
            methods: unique,
        }
    }

    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// What the interceptor knows about an inbound request when asking the host
/// router to match it.
#[derive(Clone, Copy, Debug)]
pub struct RouteRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// Route template already selected by the framework, when it exposes one.
    pub matched_path: Option<&'a str>,
    pub host: Option<&'a str>,
}

/// Route introspection and matching, implemented by the embedding framework.
pub trait HostRouter: Send + Sync {
    /// Every registered route, in the router's iteration order.
    fn routes(&self) -> Vec<RouteDescriptor>;

    /// The handler serving `endpoint`, if the endpoint is bound to one.
    fn handler(&self, endpoint: &str) -> Option<HandlerRef>;

    /// Resolve a request to the endpoint the live router would dispatch it to.
    fn match_request(&self, request: &RouteRequest<'_>) -> Result<String, RouteMatchError>;

    fn handler_id(&self, endpoint: &str, method: &Method) -> Option<String> {
        self.handler(endpoint).map(|handler| handler.handler_id(method))
    }
}
