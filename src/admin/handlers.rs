use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::plugin::switch::SwitchSnapshot;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub routes: usize,
    pub plugin_generation: u64,
    pub refresh_seq: u64,
    pub last_refresh_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteSummary {
    pub identity: String,
    pub id: i64,
    pub name: String,
    pub order: i32,
    pub version: i32,
    pub predicate: String,
    pub plugins: Vec<PluginSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PluginSummary {
    pub name: String,
    pub identity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PluginTable {
    pub generation: u64,
    pub definitions: Vec<PluginSummary>,
    pub instances: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SwitchGroupStatus {
    pub group: String,
    pub switches: Vec<SwitchSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    /// Reload plugin manifests and libraries before rebuilding routes.
    #[serde(default)]
    pub plugins: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResult {
    pub routes: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let generation = state.refresh.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        started_at: state.started_at,
        routes: state.routes.snapshot().len(),
        plugin_generation: state.loader.generation(),
        refresh_seq: generation.seq,
        last_refresh_error: generation.result.err(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteSummary>> {
    let routes = state.routes.snapshot();
    Json(
        routes
            .iter()
            .map(|route| RouteSummary {
                identity: route.identity().to_string(),
                id: route.id(),
                name: route.name().to_string(),
                order: route.order(),
                version: route.version(),
                predicate: route.predicate().to_string(),
                plugins: route
                    .plugins()
                    .iter()
                    .map(|p| PluginSummary {
                        name: p.name().to_string(),
                        identity: p.identity().to_string(),
                    })
                    .collect(),
            })
            .collect(),
    )
}

pub async fn get_plugins(State(state): State<AdminState>) -> Json<PluginTable> {
    Json(PluginTable {
        generation: state.loader.generation(),
        definitions: state
            .loader
            .definitions()
            .into_iter()
            .map(|(name, identity)| PluginSummary { name, identity })
            .collect(),
        instances: state.loader.instance_identities(),
    })
}

pub async fn get_switches(State(state): State<AdminState>) -> Json<Vec<SwitchGroupStatus>> {
    Json(
        state
            .loader
            .switches()
            .snapshot()
            .into_iter()
            .map(|(group, switches)| SwitchGroupStatus { group, switches })
            .collect(),
    )
}

pub async fn post_refresh(
    State(state): State<AdminState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<RefreshResult>, (StatusCode, String)> {
    if params.plugins {
        state
            .loader
            .reload()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }
    let routes = state
        .refresh
        .refresh_and_wait()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    tracing::info!(routes, reload_plugins = params.plugins, "Refresh requested through admin API");
    Ok(Json(RefreshResult { routes }))
}
