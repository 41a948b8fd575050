//! Status API
//!
//! Read-only HTTP view of the monitor's services.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v1/ping` | Liveness, returns `{}` |
//! | GET | `/v1/services` | Every service with its status, sorted by name |

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use ureq::Agent;

use crate::error::{Error, Result};
use crate::monitor::Monitor;
use crate::registry::ServiceStatus;
use crate::warden::Shutdown;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Monitor,
}

/// Body of `GET /v1/services`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub total: usize,
    pub data_list: Vec<ServiceStatus>,
}

/// Build the API router
pub fn build_router(monitor: Monitor) -> Router {
    let state = ApiState { monitor };

    let v1 = Router::new()
        .route("/ping", get(ping))
        .route("/services", get(list_services))
        .with_state(state);

    Router::new().nest("/v1", v1)
}

/// GET /v1/ping
pub async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

/// GET /v1/services
pub async fn list_services(State(state): State<ApiState>) -> Json<ListResponse> {
    let data_list = state.monitor.get_all();
    Json(ListResponse {
        total: data_list.len(),
        data_list,
    })
}

/// Serve the API on `listener` until `shutdown` fires
pub async fn serve(listener: TcpListener, monitor: Monitor, mut shutdown: Shutdown) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "status API listening");

    axum::serve(listener, build_router(monitor))
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
        .map_err(|e| Error::Api(e.to_string()))?;

    info!("status API stopped");
    Ok(())
}

/// Fetch the service list from a running instance at `addr` (host:port)
///
/// Blocking; meant for the CLI.
pub fn fetch_status(addr: &str) -> Result<ListResponse> {
    let config = Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(10)))
        .build();
    let agent = Agent::new_with_config(config);
    let url = format!("http://{}/v1/services", addr);

    let mut resp = agent
        .get(&url)
        .call()
        .map_err(|e| Error::Http(format!("{}: {}", url, e)))?;
    let body = resp
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::Http(e.to_string()))?;

    serde_json::from_str(&body).map_err(|e| Error::Http(format!("invalid response: {}", e)))
}
