//! Pre-dispatch authorization check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::http::Method;
use tracing::{debug, info, warn};

use crate::catalog::{PermissionEntry, PolicyCatalog};
use crate::config::IamConfig;
use crate::error::{DenyReason, ForbiddenAccess, IamError};
use crate::route::{HandlerRef, HostRouter, RouteRequest};
use crate::rules::{RuleOptions, RuleRegistry};
use crate::web::ResourceRouter;

/// Application-supplied decision function: is this permission granted?
pub type PermissionCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Why a request was let through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    FilteringDisabled,
    Granted(String),
    UndefinedPolicyAuthorized,
}

/// Shared handle to one interceptor instance. Clones observe the same
/// filtering switch.
#[derive(Clone)]
pub struct Iam {
    inner: Arc<IamInner>,
}

struct IamInner {
    router: Arc<dyn HostRouter>,
    rules: RuleRegistry,
    callback: PermissionCallback,
    undefined_policy_authorized: bool,
    resource_suffix: String,
    filtering_disabled: AtomicBool,
}

impl fmt::Debug for Iam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iam")
            .field("rules", &self.inner.rules.len())
            .field(
                "undefined_policy_authorized",
                &self.inner.undefined_policy_authorized,
            )
            .field("resource_suffix", &self.inner.resource_suffix)
            .field("filtering_disabled", &self.filtering_disabled())
            .finish()
    }
}

impl Iam {
    pub fn builder() -> IamBuilder {
        IamBuilder::default()
    }

    /// Decide whether `request` may reach its handler.
    pub fn authorize(&self, request: &RouteRequest<'_>) -> Result<Decision, ForbiddenAccess> {
        if self.filtering_disabled() {
            return Ok(Decision::FilteringDisabled);
        }
        let handler_id = self.resolve(request);
        self.authorize_handler(handler_id.as_deref())
    }

    /// Decision for an already resolved handler identifier.
    pub fn authorize_handler(&self, handler_id: Option<&str>) -> Result<Decision, ForbiddenAccess> {
        if self.filtering_disabled() {
            return Ok(Decision::FilteringDisabled);
        }
        let Some(handler_id) = handler_id else {
            return self.undefined(DenyReason::Unresolved);
        };

        let catalog = self.catalog();
        match catalog.for_handler(handler_id).as_slice() {
            [entry] => {
                if (self.inner.callback)(&entry.name) {
                    debug!(handler = handler_id, permission = %entry.name, "iam permission granted");
                    Ok(Decision::Granted(entry.name.clone()))
                } else {
                    debug!(handler = handler_id, permission = %entry.name, "iam permission rejected");
                    Err(ForbiddenAccess::rejected(entry.name.clone()))
                }
            }
            [] => {
                debug!(handler = handler_id, "no iam policy for handler");
                self.undefined(DenyReason::Unmapped)
            }
            entries => {
                debug!(handler = handler_id, count = entries.len(), "ambiguous iam policy for handler");
                self.undefined(DenyReason::Ambiguous(entries.len()))
            }
        }
    }

    fn resolve(&self, request: &RouteRequest<'_>) -> Option<String> {
        let router = &self.inner.router;
        match router.match_request(request) {
            Ok(endpoint) => router.handler_id(&endpoint, request.method),
            Err(err) => {
                debug!(path = request.path, method = %request.method, error = %err, "route match failed");
                None
            }
        }
    }

    fn undefined(&self, reason: DenyReason) -> Result<Decision, ForbiddenAccess> {
        if self.inner.undefined_policy_authorized {
            Ok(Decision::UndefinedPolicyAuthorized)
        } else {
            Err(ForbiddenAccess::undefined(reason))
        }
    }

    /// Rebuild the catalog from the current route table.
    pub fn catalog(&self) -> PolicyCatalog {
        PolicyCatalog::build(
            self.inner.router.as_ref(),
            &self.inner.rules,
            &self.inner.resource_suffix,
        )
    }

    /// Public listing: permission name to description, sorted by name.
    pub fn policies(&self) -> BTreeMap<String, String> {
        self.catalog().descriptions()
    }

    pub fn raw_policies(&self) -> Vec<PermissionEntry> {
        self.catalog().into_entries()
    }

    pub fn undefined_policy_authorized(&self) -> bool {
        self.inner.undefined_policy_authorized
    }

    pub fn filtering_disabled(&self) -> bool {
        self.inner.filtering_disabled.load(Ordering::Acquire)
    }

    /// Bypass every check until switched back.
    pub fn set_filtering_disabled(&self, disabled: bool) {
        let previous = self.inner.filtering_disabled.swap(disabled, Ordering::AcqRel);
        if previous != disabled {
            info!(disabled, "iam filtering switched");
        }
    }
}

#[derive(Default)]
pub struct IamBuilder {
    router: Option<Arc<dyn HostRouter>>,
    callback: Option<PermissionCallback>,
    rules: RuleRegistry,
    config: IamConfig,
    undefined_policy_authorized: Option<bool>,
}

impl IamBuilder {
    pub fn router(self, router: impl HostRouter + 'static) -> Self {
        self.shared_router(Arc::new(router))
    }

    pub fn shared_router(mut self, router: Arc<dyn HostRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn permission_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn rule(mut self, handler: &HandlerRef, method: &Method, options: RuleOptions) -> Self {
        self.rules.rule(handler, method, options);
        self
    }

    /// Base settings. An explicit [`IamBuilder::undefined_policy_authorized`]
    /// wins over the config whichever is called first.
    pub fn config(mut self, config: IamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn undefined_policy_authorized(mut self, authorized: bool) -> Self {
        self.undefined_policy_authorized = Some(authorized);
        self
    }

    pub fn build(self) -> Result<Iam, IamError> {
        let router = self
            .router
            .ok_or(IamError::Setup("a host router is required"))?;
        let callback = self
            .callback
            .ok_or(IamError::Setup("a permission callback is required"))?;
        let iam = Iam {
            inner: Arc::new(IamInner {
                router,
                rules: self.rules,
                callback,
                undefined_policy_authorized: self
                    .undefined_policy_authorized
                    .unwrap_or(self.config.undefined_policy_authorized),
                resource_suffix: self.config.resource_suffix,
                filtering_disabled: AtomicBool::new(self.config.disable_filtering),
            }),
        };
        // Rebuilds only log at debug level.
        for collision in iam.catalog().collisions() {
            warn!(
                permission = %collision.name,
                dropped = %collision.dropped,
                kept = %collision.kept,
                "permission name derived by two handlers; last one wins"
            );
        }
        Ok(iam)
    }

    /// Build against `app`'s route table and attach the check to every route
    /// registered so far.
    pub fn install<S>(self, app: ResourceRouter<S>) -> Result<(Iam, Router<S>), IamError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let (router, table) = app.into_parts();
        let routes = table.routes().len();
        let iam = self.router(table).build()?;
        info!(
            routes,
            policies = iam.catalog().len(),
            undefined_policy_authorized = iam.undefined_policy_authorized(),
            "iam interceptor installed"
        );
        let router = iam.protect(router);
        Ok((iam, router))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::RouteMatchError;
    use crate::route::{HandlerKind, RouteDescriptor};

    /// Router with fixed routes; `{param}` segments match any single segment.
    struct FixedRoutes(Vec<(RouteDescriptor, Option<HandlerRef>)>);

    fn template_matches(template: &str, path: &str) -> bool {
        let template: Vec<_> = template.split('/').collect();
        let path: Vec<_> = path.split('/').collect();
        template.len() == path.len()
            && template.iter().zip(&path).all(|(expected, actual)| {
                expected == actual || (expected.starts_with('{') && expected.ends_with('}'))
            })
    }

    impl HostRouter for FixedRoutes {
        fn routes(&self) -> Vec<RouteDescriptor> {
            self.0.iter().map(|(route, _)| route.clone()).collect()
        }

        fn handler(&self, endpoint: &str) -> Option<HandlerRef> {
            self.0
                .iter()
                .find(|(route, _)| route.endpoint == endpoint)
                .and_then(|(_, handler)| handler.clone())
        }

        fn match_request(&self, request: &RouteRequest<'_>) -> Result<String, RouteMatchError> {
            let route = self
                .0
                .iter()
                .map(|(route, _)| route)
                .find(|route| template_matches(&route.path, request.path))
                .ok_or(RouteMatchError::NotFound)?;
            if route.accepts(request.method) {
                Ok(route.endpoint.clone())
            } else {
                Err(RouteMatchError::MethodNotAllowed(request.method.to_string()))
            }
        }
    }

    fn resource(endpoint: &str, path: &str, class: &str, methods: &[Method]) -> (RouteDescriptor, Option<HandlerRef>) {
        (
            RouteDescriptor::new(endpoint, path, methods.iter().cloned()),
            Some(HandlerRef::named("app", class, HandlerKind::Resource)),
        )
    }

    fn routes() -> FixedRoutes {
        FixedRoutes(vec![
            resource("users_resource", "/org/{id}/users", "UsersResource", &[Method::GET, Method::POST]),
            resource("health", "/health", "Health", &[Method::GET]),
            // Both methods derive `org.members.modify`; only PATCH keeps it.
            resource("members_resource", "/org/{id}/members", "MembersResource", &[Method::PUT, Method::PATCH]),
        ])
    }

    fn request<'a>(method: &'a Method, path: &'a str) -> RouteRequest<'a> {
        RouteRequest {
            method,
            path,
            matched_path: None,
            host: None,
        }
    }

    fn allow_all() -> IamBuilder {
        Iam::builder().router(routes()).permission_callback(|_| true)
    }

    #[test]
    fn build_requires_router_and_callback() {
        let err = Iam::builder().permission_callback(|_| true).build().unwrap_err();
        assert!(matches!(err, IamError::Setup(_)));
        let err = Iam::builder().router(routes()).build().unwrap_err();
        assert!(err.to_string().contains("permission callback"));
    }

    #[test]
    fn single_policy_is_passed_to_callback() {
        let iam = Iam::builder()
            .router(routes())
            .permission_callback(|name| name == "org.users.read")
            .build()
            .unwrap();

        let granted = iam.authorize(&request(&Method::GET, "/org/1/users")).unwrap();
        assert_eq!(granted, Decision::Granted("org.users.read".into()));

        let err = iam.authorize(&request(&Method::POST, "/org/1/users")).unwrap_err();
        assert_eq!(err, ForbiddenAccess::rejected("org.users.create"));
    }

    #[test]
    fn override_changes_permission_seen_by_callback() {
        let handler = HandlerRef::named("app", "UsersResource", HandlerKind::Resource);
        let iam = allow_all()
            .rule(&handler, &Method::GET, RuleOptions::new().action("list"))
            .build()
            .unwrap();
        let decision = iam.authorize(&request(&Method::GET, "/org/1/users")).unwrap();
        assert_eq!(decision, Decision::Granted("org.users.list".into()));
    }

    #[test]
    fn unmapped_and_unresolved_fail_closed() {
        let iam = allow_all().build().unwrap();

        let err = iam.authorize(&request(&Method::GET, "/health")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Unmapped);
        let err = iam.authorize(&request(&Method::GET, "/missing")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Unresolved);
        let err = iam.authorize(&request(&Method::DELETE, "/org/1/users")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Unresolved);
        // PUT lost its entry to PATCH.
        let err = iam.authorize(&request(&Method::PUT, "/org/1/members")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Unmapped);
    }

    #[test]
    fn undefined_policy_authorized_opens_unmapped_routes() {
        let iam = allow_all().undefined_policy_authorized(true).build().unwrap();
        assert_eq!(
            iam.authorize(&request(&Method::GET, "/health")).unwrap(),
            Decision::UndefinedPolicyAuthorized
        );
        assert_eq!(
            iam.authorize(&request(&Method::GET, "/missing")).unwrap(),
            Decision::UndefinedPolicyAuthorized
        );
    }

    #[test]
    fn ambiguous_handler_never_reaches_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // Two routes share one resource type, so `Shared.get` maps to two names.
        let router = FixedRoutes(vec![
            resource("a_resource", "/alpha/items", "Shared", &[Method::GET]),
            resource("b_resource", "/beta/items", "Shared", &[Method::GET]),
        ]);
        let iam = Iam::builder()
            .router(router)
            .permission_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            })
            .build()
            .unwrap();

        assert_eq!(iam.catalog().for_handler("Shared.get").len(), 2);
        let err = iam.authorize(&request(&Method::GET, "/alpha/items")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Ambiguous(2));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_filtering_skips_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let iam = Iam::builder()
            .router(routes())
            .permission_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                false
            })
            .build()
            .unwrap();

        let clone = iam.clone();
        clone.set_filtering_disabled(true);
        assert!(iam.filtering_disabled());
        for (method, path) in [(Method::GET, "/org/1/users"), (Method::GET, "/missing")] {
            assert_eq!(
                iam.authorize(&request(&method, path)).unwrap(),
                Decision::FilteringDisabled
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        iam.set_filtering_disabled(false);
        assert!(iam.authorize(&request(&Method::GET, "/org/1/users")).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concrete_paths_resolve_through_templates() {
        let iam = allow_all().build().unwrap();
        assert_eq!(
            iam.catalog().get("org.users.read").unwrap().handler_id,
            "UsersResource.get"
        );
        assert_eq!(
            iam.authorize(&request(&Method::GET, "/org/42/users")).unwrap(),
            Decision::Granted("org.users.read".into())
        );
        let err = iam.authorize(&request(&Method::GET, "/org/42/users/7")).unwrap_err();
        assert_eq!(err.reason, DenyReason::Unresolved);
    }

    #[test]
    fn explicit_undefined_setting_survives_config() {
        let iam = allow_all()
            .undefined_policy_authorized(true)
            .config(IamConfig::default())
            .build()
            .unwrap();
        assert!(iam.undefined_policy_authorized());

        let config = IamConfig {
            undefined_policy_authorized: true,
            ..IamConfig::default()
        };
        assert!(allow_all().config(config.clone()).build().unwrap().undefined_policy_authorized());
        let iam = allow_all()
            .config(config)
            .undefined_policy_authorized(false)
            .build()
            .unwrap();
        assert!(!iam.undefined_policy_authorized());
    }

    #[test]
    fn collisions_are_reported_by_the_catalog() {
        let iam = allow_all().build().unwrap();
        let catalog = iam.catalog();
        assert_eq!(catalog.collisions().len(), 1);
        assert_eq!(catalog.collisions()[0].dropped, "MembersResource.put");
        assert_eq!(catalog.collisions()[0].kept, "MembersResource.patch");
    }

    #[test]
    fn config_seeds_filtering_switch() {
        let config = IamConfig {
            disable_filtering: true,
            ..IamConfig::default()
        };
        let iam = allow_all().config(config).build().unwrap();
        assert!(iam.filtering_disabled());
    }

    #[test]
    fn listings_agree() {
        let iam = allow_all().build().unwrap();
        let public = iam.policies();
        let raw = iam.raw_policies();

        assert_eq!(public.len(), raw.len());
        assert_eq!(
            public.keys().cloned().collect::<Vec<_>>(),
            vec!["org.members.modify", "org.users.create", "org.users.read"]
        );
        assert_eq!(raw[0].name, "org.users.read");
    }
}
