//! Entry dispatcher.
//!
//! # Responsibilities
//! - Find the first cached route whose predicate accepts the request
//! - Run that route's plugin chain
//! - Write the fixed "Api Not Found" message when nothing matches
//!
//! # Data Flow
//! ```text
//! NO_MATCH
//!     → for route in snapshot (order ascending):
//!         candidate route = identity
//!         predicate true  → MATCHED → plugin chain → DONE
//!         predicate false → next
//!         predicate error → logged, next
//!     → NOT_FOUND → clear match facts → fixed message → DONE
//! ```
//!
//! # Design Decisions
//! - Sequential scan with early return; later routes are never evaluated
//! - One snapshot per request, so a concurrent refresh cannot change the
//!   table halfway through the scan

use axum::body::Body;
use axum::http::Response;
use std::sync::Arc;
use std::time::Instant;

use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::http::response::HttpMsg;
use crate::locator::route::CachingRouteLocator;
use crate::observability::metrics::{self, DispatchOutcome};
use crate::plugin::{CapableSwitchManager, PluginChain};
use crate::routing::route::Route;

/// Matches requests to routes and runs their plugins.
pub struct Dispatcher {
    routes: Arc<CachingRouteLocator>,
    switches: Arc<CapableSwitchManager>,
}

impl Dispatcher {
    pub fn new(routes: Arc<CachingRouteLocator>, switches: Arc<CapableSwitchManager>) -> Self {
        Self { routes, switches }
    }

    /// First route whose predicate accepts the request.
    pub async fn lookup(&self, exchange: &mut Exchange) -> Option<Arc<Route>> {
        let routes = self.routes.snapshot();
        for route in routes.iter() {
            exchange.set_candidate_route(route.identity());
            match route.predicate().evaluate(exchange).await {
                Ok(true) => {
                    tracing::debug!(route = %route.identity(), "Route matched");
                    return Some(route.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(route = %route.identity(), error = %e, "Predicate failed, treating as no match");
                }
            }
        }
        None
    }

    /// Route the exchange and run the matched chain.
    ///
    /// Plugin errors are returned to the caller; a missing route is not an
    /// error.
    pub async fn dispatch(&self, exchange: &mut Exchange) -> Result<DispatchOutcome, PluginError> {
        let start = Instant::now();
        let Some(route) = self.lookup(exchange).await else {
            tracing::debug!(request = %exchange.describe(), "No route matched");
            exchange.clear_match_facts();
            *exchange.response_mut() = HttpMsg::not_found().into_response();
            exchange.complete();
            metrics::record_dispatch(DispatchOutcome::NotFound, None, start);
            return Ok(DispatchOutcome::NotFound);
        };

        exchange.set_matched_route(route.clone());
        let chain = PluginChain::new(route.plugins(), &self.switches);
        match chain.proceed(exchange).await {
            Ok(()) => {
                metrics::record_dispatch(DispatchOutcome::Matched, Some(route.identity()), start);
                Ok(DispatchOutcome::Matched)
            }
            Err(e) => {
                metrics::record_dispatch(DispatchOutcome::Error, Some(route.identity()), start);
                Err(e)
            }
        }
    }

    /// Dispatch and turn the exchange into a response; plugin errors become `500`.
    pub async fn respond(&self, mut exchange: Exchange) -> Response<Body> {
        match self.dispatch(&mut exchange).await {
            Ok(_) => exchange.into_response(),
            Err(e) => {
                tracing::error!(request = %exchange.describe(), error = %e, "Plugin chain failed");
                HttpMsg::internal_error().into_response()
            }
        }
    }

    pub fn routes(&self) -> &Arc<CachingRouteLocator> {
        &self.routes
    }
}
