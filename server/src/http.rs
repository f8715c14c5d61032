use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use anyhow::Context;
use axum::extract::State;
use axum::http::HeaderName;
use axum::routing::get;
use axum::{Json, Router};
use platform_authz::{Iam, IamError};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{config::AppConfig, resources};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

/// Wire the demo resources behind the interceptor. The decision callback
/// grants whatever `config` lists.
pub fn install_iam(config: &AppConfig) -> Result<(Iam, Router), IamError> {
    let decisions = config.clone();
    Iam::builder()
        .config(config.iam.clone())
        .rules(resources::rules())
        .permission_callback(move |permission| decisions.is_granted(permission))
        .install(resources::routes())
}

pub async fn serve(serve: ServeConfig, config: &AppConfig) -> anyhow::Result<()> {
    let (iam, protected) = install_iam(config).context("failed to install IAM interceptor")?;
    let router = build_router(iam, protected);
    let listener = tokio::net::TcpListener::bind(serve.addr)
        .await
        .with_context(|| format!("failed to bind {}", serve.addr))?;

    info!(addr = %serve.addr, "iam server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

/// `/health` and `/policies` stay outside the interceptor.
pub fn build_router(iam: Iam, protected: Router) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/policies", get(policies_handler))
        .with_state(iam)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http()),
        )
}

async fn health_handler(State(iam): State<Iam>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        filtering_disabled: iam.filtering_disabled(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn policies_handler(State(iam): State<Iam>) -> Json<BTreeMap<String, String>> {
    Json(iam.policies())
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    filtering_disabled: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
