// HTTP gateway the panel talks to, fronting `docker ps` and the toggle service.

pub mod docker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::sync::model::{PanelConfig, ServiceDescriptor, ToggleRequest};
use docker::{ServiceStatusEntry, build_statuses, parse_ps_output};

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Contents of the gateway's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub docker_status_url: String,
    #[serde(default)]
    pub toggle_service_url: String,
    #[serde(default)]
    pub poll_interval_seconds: Option<i64>,
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path).map_err(|source| GatewayError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GatewayError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The subset handed to panel clients.
    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            services: self.services.clone(),
            poll_interval_seconds: self.poll_interval_seconds,
        }
    }
}

pub struct GatewayState {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

type ApiError = (StatusCode, String);

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/config", get(handle_config))
        .route("/api/status", get(handle_status))
        .route("/api/toggle", post(handle_toggle))
        .with_state(state)
}

async fn handle_config(State(state): State<Arc<GatewayState>>) -> Json<PanelConfig> {
    Json(state.config.panel_config())
}

async fn handle_status(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<Vec<ServiceStatusEntry>>, ApiError> {
    let resp = state
        .client
        .get(&state.config.docker_status_url)
        .send()
        .await
        .map_err(|err| {
            error!(error = %err, "error fetching docker status");
            internal("Failed to fetch service status")
        })?;
    let body = resp.text().await.map_err(|err| {
        error!(error = %err, "error reading docker status");
        internal("Failed to read service status")
    })?;

    let containers = parse_ps_output(&body);
    Ok(Json(build_statuses(&state.config.services, &containers)))
}

async fn handle_toggle(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Ok(Json(request)) = payload else {
        return Err((StatusCode::BAD_REQUEST, "Invalid request body".to_string()));
    };
    let Some((action, service)) = request.action() else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Exactly one of \"up\" or \"down\" must name a service".to_string(),
        ));
    };
    info!(service, action = action.as_str(), "forwarding toggle");

    let resp = state
        .client
        .post(&state.config.toggle_service_url)
        .json(&request)
        .send()
        .await
        .map_err(|err| {
            error!(error = %err, "error toggling service");
            internal("Failed to toggle service")
        })?;

    let upstream = resp.status().as_u16();
    if upstream != 200 && upstream != 202 {
        warn!(status = upstream, service, "toggle service rejected request");
        let status = StatusCode::from_u16(upstream).unwrap_or(StatusCode::BAD_GATEWAY);
        return Err((
            status,
            format!("Service toggle failed with status {upstream}"),
        ));
    }

    Ok(Json(json!({ "status": "success" })))
}

fn internal(message: &str) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}
