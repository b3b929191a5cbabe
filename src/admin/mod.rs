//! Admin API.
//!
//! # Responsibilities
//! - Expose the live route table, plugin table and switches read-only
//! - Let operators trigger a refresh
//!
//! # Design Decisions
//! - Served on its own listener so it never shares a port with gateway traffic
//! - Every endpoint requires the configured Bearer key

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::locator::refresh::RefreshHandle;
use crate::locator::route::CachingRouteLocator;
use crate::plugin::PluginLoader;

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub api_key: Arc<str>,
    pub routes: Arc<CachingRouteLocator>,
    pub loader: Arc<PluginLoader>,
    pub refresh: RefreshHandle,
    pub started_at: DateTime<Utc>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/plugins", get(get_plugins))
        .route("/admin/switches", get(get_switches))
        .route("/admin/refresh", post(post_refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
