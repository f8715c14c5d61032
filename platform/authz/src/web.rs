//! axum glue: a route table the policy layer can walk, and the middleware
//! that runs the check before dispatch.

use std::collections::HashMap;

use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::handler::Handler;
use axum::http::uri::Authority;
use axum::http::{Method, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::MethodRouter;
use tracing::debug;

use crate::error::{ForbiddenAccess, RouteMatchError};
use crate::interceptor::Iam;
use crate::route::{HandlerRef, HostRouter, RouteDescriptor, RouteRequest};

/// Routes and endpoint handlers as registered through [`ResourceRouter`].
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
    handlers: HashMap<String, HandlerRef>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics when `endpoint` is already bound to a different handler.
    pub fn insert(
        &mut self,
        endpoint: &str,
        path: &str,
        handler: HandlerRef,
        methods: impl IntoIterator<Item = Method>,
    ) {
        if let Some(existing) = self.handlers.get(endpoint) {
            assert!(
                *existing == handler,
                "endpoint `{endpoint}` is already served by `{}`",
                existing.qualified_name()
            );
        }
        debug!(
            endpoint,
            path,
            handler = handler.qualified_name(),
            kind = ?handler.kind(),
            "route registered"
        );
        self.handlers.insert(endpoint.to_string(), handler);
        self.routes.push(RouteDescriptor::new(endpoint, path, methods));
    }

}

impl HostRouter for RouteTable {
    fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.clone()
    }

    fn handler(&self, endpoint: &str) -> Option<HandlerRef> {
        self.handlers.get(endpoint).cloned()
    }

    fn match_request(&self, request: &RouteRequest<'_>) -> Result<String, RouteMatchError> {
        if let Some(host) = request.host {
            host.parse::<Authority>()
                .map_err(|_| RouteMatchError::MalformedHost(host.to_string()))?;
        }
        // axum only records the template for requests it routed.
        let path = request.matched_path.ok_or(RouteMatchError::NotFound)?;
        let mut candidates = self.routes.iter().filter(|route| route.path == path).peekable();
        if candidates.peek().is_none() {
            return Err(RouteMatchError::NotFound);
        }
        candidates
            .find(|route| route.accepts(request.method))
            .map(|route| route.endpoint.clone())
            .ok_or_else(|| RouteMatchError::MethodNotAllowed(request.method.to_string()))
    }
}

/// Method handlers for one route, recording which methods were bound.
pub struct ResourceMethods<S = ()> {
    router: MethodRouter<S>,
    methods: Vec<Method>,
}

impl<S> ResourceMethods<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            router: MethodRouter::new(),
            methods: Vec::new(),
        }
    }

    /// Also answers `HEAD`, as axum does for `GET` handlers.
    pub fn get<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.router = self.router.get(handler);
        self.methods.extend([Method::GET, Method::HEAD]);
        self
    }

    pub fn post<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.router = self.router.post(handler);
        self.methods.push(Method::POST);
        self
    }

    pub fn put<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.router = self.router.put(handler);
        self.methods.push(Method::PUT);
        self
    }

    pub fn patch<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.router = self.router.patch(handler);
        self.methods.push(Method::PATCH);
        self
    }

    pub fn delete<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.router = self.router.delete(handler);
        self.methods.push(Method::DELETE);
        self
    }
}

/// Builds an axum [`Router`] and the matching [`RouteTable`] side by side.
pub struct ResourceRouter<S = ()> {
    router: Router<S>,
    table: RouteTable,
}

impl<S> Default for ResourceRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ResourceRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            table: RouteTable::new(),
        }
    }

    /// Register `path` under `endpoint`, served by `handler`.
    ///
    /// ```ignore
    /// ResourceRouter::new().route(
    ///     "/org/{org_id}/users",
    ///     "users_resource",
    ///     HandlerRef::resource::<UsersResource>(),
    ///     |m| m.get(UsersResource::get).post(UsersResource::post),
    /// )
    /// ```
    pub fn route<F>(mut self, path: &str, endpoint: &str, handler: HandlerRef, methods: F) -> Self
    where
        F: FnOnce(ResourceMethods<S>) -> ResourceMethods<S>,
    {
        let ResourceMethods { router, methods } = methods(ResourceMethods::new());
        self.table.insert(endpoint, path, handler, methods);
        self.router = self.router.route(path, router);
        self
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn into_parts(self) -> (Router<S>, RouteTable) {
        (self.router, self.table)
    }
}

impl Iam {
    /// Run the check in front of every route currently in `router`.
    pub fn protect<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(
            self.clone(),
            check_iam_permission,
        ))
    }
}

/// Pre-dispatch middleware. On success the [`crate::Decision`] is stored in the
/// request extensions.
pub async fn check_iam_permission(
    State(iam): State<Iam>,
    mut request: Request,
    next: Next,
) -> Result<Response, ForbiddenAccess> {
    let decision = iam.authorize(&route_request(&request))?;
    request.extensions_mut().insert(decision);
    Ok(next.run(request).await)
}

fn route_request(request: &Request) -> RouteRequest<'_> {
    RouteRequest {
        method: request.method(),
        path: request.uri().path(),
        matched_path: request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str),
        host: request
            .headers()
            .get(header::HOST)
            .map(|value| value.to_str().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::HandlerKind;

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table.insert(
            "users_resource",
            "/org/{org_id}/users",
            HandlerRef::named("app", "UsersResource", HandlerKind::Resource),
            [Method::GET, Method::HEAD, Method::POST],
        );
        table.insert(
            "user_resource",
            "/org/{org_id}/users/{user_id}",
            HandlerRef::named("app", "UserResource", HandlerKind::Resource),
            [Method::GET, Method::HEAD, Method::DELETE],
        );
        table
    }

    fn target<'a>(method: &'a Method, matched: Option<&'a str>, host: Option<&'a str>) -> RouteRequest<'a> {
        RouteRequest {
            method,
            path: "/org/1/users",
            matched_path: matched,
            host,
        }
    }

    #[test]
    fn matches_template_and_method() {
        let table = table();
        let endpoint = table
            .match_request(&target(&Method::POST, Some("/org/{org_id}/users"), Some("localhost:8080")))
            .unwrap();
        assert_eq!(endpoint, "users_resource");
        assert_eq!(
            table.handler_id(&endpoint, &Method::POST).as_deref(),
            Some("UsersResource.post")
        );
    }

    #[test]
    fn match_failures() {
        let table = table();
        assert_eq!(
            table.match_request(&target(&Method::GET, None, None)),
            Err(RouteMatchError::NotFound)
        );
        assert_eq!(
            table.match_request(&target(&Method::GET, Some("/other"), None)),
            Err(RouteMatchError::NotFound)
        );
        assert_eq!(
            table.match_request(&target(&Method::PUT, Some("/org/{org_id}/users"), None)),
            Err(RouteMatchError::MethodNotAllowed("PUT".into()))
        );
        assert_eq!(
            table.match_request(&target(&Method::GET, Some("/org/{org_id}/users"), Some("bad host"))),
            Err(RouteMatchError::MalformedHost("bad host".into()))
        );
        assert!(matches!(
            table.match_request(&target(&Method::GET, Some("/org/{org_id}/users"), Some(""))),
            Err(RouteMatchError::MalformedHost(_))
        ));
    }

    #[test]
    #[should_panic(expected = "already served")]
    fn endpoint_cannot_change_handler() {
        let mut table = table();
        table.insert(
            "users_resource",
            "/people",
            HandlerRef::named("app", "PeopleResource", HandlerKind::Resource),
            [Method::GET],
        );
    }

    #[test]
    fn resource_router_records_bound_methods() {
        async fn noop() {}

        let router: ResourceRouter = ResourceRouter::new().route(
            "/org/{org_id}/users",
            "users_resource",
            HandlerRef::function(&noop),
            |m| m.get(noop).post(noop).delete(noop),
        );
        let routes = router.table().routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(
            routes[0].methods,
            vec![Method::GET, Method::HEAD, Method::POST, Method::DELETE]
        );
        assert_eq!(router.table().handler("users_resource").unwrap().qualified_name(), "noop");
    }
}
