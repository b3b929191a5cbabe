//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Detect duplicate route ids across inline routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Route definitions are only checked structurally here; predicate and
//!   plugin resolution failures are route-scoped and handled at refresh time

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid socket address", value),
        ));
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than 0",
        ));
    }

    if config.refresh.watch_route_files && config.refresh.poll_interval_secs == 0 {
        errors.push(ValidationError::new(
            "refresh.poll_interval_secs",
            "must be greater than 0",
        ));
    }

    let mut ids = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if !ids.insert(route.id) {
            errors.push(ValidationError::new(
                format!("routes[{}].id", i),
                format!("duplicate route id {}", route.id),
            ));
        }
        for (j, plugin) in route.plugins.iter().enumerate() {
            if plugin.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("routes[{}].plugins[{}].name", i, j),
                    "must not be empty",
                ));
            }
        }
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set when the admin API is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
