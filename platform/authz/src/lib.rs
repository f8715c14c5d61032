//! Authorization derived from the application's own route table.
//!
//! Every route whose endpoint name ends with the resource suffix (`_resource`
//! by default) gets one permission per HTTP method, named after the first two
//! path segments plus an action (`org.users.read`). A pre-dispatch layer
//! resolves each request to its permission and asks an application-supplied
//! callback whether it is granted. Anything that cannot be resolved to exactly
//! one permission is denied unless `undefined_policy_authorized` is set.

pub mod catalog;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod route;
pub mod rules;
pub mod web;

pub use catalog::{NameCollision, PermissionEntry, PolicyCatalog};
pub use config::IamConfig;
pub use error::{DenyReason, ForbiddenAccess, IamError, RouteMatchError};
pub use interceptor::{Decision, Iam, IamBuilder, PermissionCallback};
pub use route::{HandlerKind, HandlerRef, HostRouter, RouteDescriptor, RouteRequest};
pub use rules::{RuleOptions, RuleOverride, RuleRegistry};
pub use web::{ResourceMethods, ResourceRouter, RouteTable, check_iam_permission};
