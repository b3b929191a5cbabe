//! Host predicate.
//!
//! Patterns use `.` as the separator, so `{sub}.example.com` and
//! `**.example.com` work the same way path patterns do. Host matching is
//! case-insensitive (RFC 9110).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;
use crate::predicate::path::PathPattern;
use crate::predicate::registry::{bind, PredicateConfig, PredicateKind, ShortcutType};
use crate::predicate::{Predicate, PredicateFactory, RoutePredicate};

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub patterns: Vec<String>,
}

impl PredicateConfig for HostConfig {
    fn validate(&self) -> Result<(), String> {
        if self.patterns.is_empty() {
            return Err("patterns must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct HostPredicate {
    patterns: Vec<PathPattern>,
}

impl HostPredicate {
    pub fn new(config: &HostConfig) -> Result<Self, String> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| PathPattern::with_separator(&p.to_lowercase(), '.'))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

/// The request host: the `Host` header, else the URI authority.
fn request_host(exchange: &Exchange) -> Option<String> {
    let request = exchange.request();
    request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
        .map(str::to_lowercase)
}

#[async_trait]
impl RoutePredicate for HostPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        let Some(host) = request_host(exchange) else {
            return Ok(false);
        };

        let matched = self
            .patterns
            .iter()
            .find_map(|pattern| pattern.matches(&host, false));

        match matched {
            Some(vars) => {
                exchange.put_uri_template_variables(vars);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn config(&self) -> Value {
        serde_json::json!({
            "patterns": self.patterns.iter().map(PathPattern::as_str).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for HostPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<_> = self.patterns.iter().map(PathPattern::as_str).collect();
        write!(f, "Hosts: {:?}", patterns)
    }
}

pub struct HostFactory;

impl PredicateFactory for HostFactory {
    fn kind(&self) -> PredicateKind {
        PredicateKind::Host
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        &["patterns"]
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: HostConfig = bind(self.kind(), args)?;
        let predicate =
            HostPredicate::new(&config).map_err(|e| PredicateError::invalid(self.kind().name(), e))?;
        Ok(Predicate::leaf(predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn with_host(host: &str) -> Exchange {
        let req = Request::builder()
            .uri("/")
            .header("Host", host)
            .body(Body::empty())
            .unwrap();
        Exchange::new(req, None)
    }

    fn host_predicate(patterns: &[&str]) -> Predicate {
        HostFactory
            .apply(&serde_json::json!({ "patterns": patterns }))
            .unwrap()
    }

    #[tokio::test]
    async fn test_exact_host_case_insensitive() {
        let p = host_predicate(&["example.com"]);
        assert!(p.evaluate(&mut with_host("example.com")).await.unwrap());
        assert!(p.evaluate(&mut with_host("EXAMPLE.COM")).await.unwrap());
        assert!(!p.evaluate(&mut with_host("other.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_wildcard_hosts() {
        let p = host_predicate(&["**.example.org"]);
        assert!(p.evaluate(&mut with_host("a.b.example.org")).await.unwrap());
        assert!(p.evaluate(&mut with_host("example.org")).await.unwrap());
        assert!(!p.evaluate(&mut with_host("example.com")).await.unwrap());

        let p = host_predicate(&["*.example.org"]);
        assert!(p.evaluate(&mut with_host("www.example.org")).await.unwrap());
        assert!(!p.evaluate(&mut with_host("a.b.example.org")).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_variables_merged() {
        let p = host_predicate(&["{tenant}.example.org"]);
        let mut ex = with_host("acme.example.org");
        assert!(p.evaluate(&mut ex).await.unwrap());
        assert_eq!(ex.uri_variable("tenant"), Some("acme"));
    }

    #[tokio::test]
    async fn test_missing_host() {
        let p = host_predicate(&["example.com"]);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert!(!p.evaluate(&mut Exchange::new(req, None)).await.unwrap());
    }
}
