//! Demo organisation API. Users are served by resource types, projects by
//! plain handler functions.

use axum::Json;
use axum::extract::Path;
use axum::http::{Method, StatusCode};
use platform_authz::{HandlerRef, ResourceRouter, RuleOptions, RuleRegistry};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub org_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub org_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub name: String,
}

pub struct UsersResource;

impl UsersResource {
    pub async fn get(Path(org_id): Path<String>) -> Json<Vec<User>> {
        Json(vec![User {
            id: "u-1".into(),
            email: format!("owner@{org_id}.test"),
            org_id,
        }])
    }

    pub async fn post(
        Path(org_id): Path<String>,
        Json(body): Json<NewUser>,
    ) -> (StatusCode, Json<User>) {
        info!(%org_id, email = %body.email, "user invited");
        let user = User {
            id: "u-2".into(),
            org_id,
            email: body.email,
        };
        (StatusCode::CREATED, Json(user))
    }
}

pub struct UserResource;

impl UserResource {
    pub async fn get(Path((org_id, user_id)): Path<(String, String)>) -> Json<User> {
        Json(User {
            email: format!("{user_id}@{org_id}.test"),
            id: user_id,
            org_id,
        })
    }

    pub async fn put(
        Path((org_id, user_id)): Path<(String, String)>,
        Json(body): Json<NewUser>,
    ) -> Json<User> {
        Json(User {
            id: user_id,
            org_id,
            email: body.email,
        })
    }

    pub async fn delete(Path((org_id, user_id)): Path<(String, String)>) -> StatusCode {
        info!(%org_id, %user_id, "user removed");
        StatusCode::NO_CONTENT
    }
}

pub async fn list_projects(Path(org_id): Path<String>) -> Json<Vec<Project>> {
    Json(vec![Project {
        id: "p-1".into(),
        org_id,
        name: "Onboarding".into(),
    }])
}

pub async fn create_project(
    Path(org_id): Path<String>,
    Json(body): Json<NewProject>,
) -> (StatusCode, Json<Project>) {
    let project = Project {
        id: "p-2".into(),
        org_id,
        name: body.name,
    };
    (StatusCode::CREATED, Json(project))
}

pub fn routes() -> ResourceRouter {
    ResourceRouter::new()
        .route(
            "/org/{org_id}/users",
            "users_resource",
            HandlerRef::resource::<UsersResource>(),
            |m| m.get(UsersResource::get).post(UsersResource::post),
        )
        .route(
            "/org/{org_id}/users/{user_id}",
            "user_resource",
            HandlerRef::resource::<UserResource>(),
            |m| {
                m.get(UserResource::get)
                    .put(UserResource::put)
                    .delete(UserResource::delete)
            },
        )
        .route(
            "/org/{org_id}/projects",
            "projects_resource",
            HandlerRef::function(&list_projects),
            |m| m.get(list_projects),
        )
        .route(
            "/org/{org_id}/projects",
            "project_create_resource",
            HandlerRef::function(&create_project),
            |m| m.post(create_project),
        )
}

/// Listing users needs `org.users.list`; reading one user keeps `org.users.read`.
pub fn rules() -> RuleRegistry {
    let mut rules = RuleRegistry::new();
    rules.rule(
        &HandlerRef::resource::<UsersResource>(),
        &Method::GET,
        RuleOptions::new().action("list"),
    );
    rules
}
