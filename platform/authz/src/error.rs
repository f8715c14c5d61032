use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IamError {
    /// Construction precondition violated; fatal for the embedding application.
    #[error("invalid IAM setup: {0}")]
    Setup(&'static str),
}

/// Failure reported by a host router while matching a request.
///
/// The interceptor never surfaces these: every variant means "no handler".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteMatchError {
    #[error("no route matches the request path")]
    NotFound,
    #[error("method {0} not allowed on the matched route")]
    MethodNotAllowed(String),
    #[error("malformed host `{0}`")]
    MalformedHost(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The decision callback rejected the permission.
    Rejected,
    /// The request did not resolve to any handler.
    Unresolved,
    /// The handler has no permission in the catalog.
    Unmapped,
    /// The handler maps to more than one permission.
    Ambiguous(usize),
}

/// Raised when a request must be stopped before dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("forbidden access{}", permission_suffix(.permission))]
pub struct ForbiddenAccess {
    pub permission: Option<String>,
    pub reason: DenyReason,
}

impl ForbiddenAccess {
    pub fn rejected(permission: impl Into<String>) -> Self {
        Self {
            permission: Some(permission.into()),
            reason: DenyReason::Rejected,
        }
    }

    pub fn undefined(reason: DenyReason) -> Self {
        Self {
            permission: None,
            reason,
        }
    }
}

fn permission_suffix(permission: &Option<String>) -> String {
    permission
        .as_deref()
        .map(|name| format!(" to {name}"))
        .unwrap_or_default()
}

impl IntoResponse for ForbiddenAccess {
    fn into_response(self) -> Response {
        StatusCode::FORBIDDEN.into_response()
    }
}
