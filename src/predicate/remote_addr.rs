//! RemoteAddr and XForwardedRemoteAddr predicates.
//!
//! Both match the resolved client address against a list of CIDR rules; they
//! differ only in the resolver used to pick that address.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;
use crate::net::{RemoteAddressResolver, SocketAddressResolver, SubnetRule, XForwardedRemoteAddressResolver};
use crate::predicate::registry::{bind, PredicateConfig, PredicateKind, ShortcutType};
use crate::predicate::{Predicate, PredicateFactory, RoutePredicate};

fn parse_sources(kind: PredicateKind, sources: &[String]) -> Result<Vec<SubnetRule>, PredicateError> {
    sources
        .iter()
        .map(|s| s.parse().map_err(|e| PredicateError::invalid(kind.name(), e)))
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAddrConfig {
    pub sources: Vec<String>,
}

impl PredicateConfig for RemoteAddrConfig {
    fn validate(&self) -> Result<(), String> {
        if self.sources.is_empty() {
            return Err("sources must not be empty".into());
        }
        Ok(())
    }
}

fn default_max_trusted_index() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XForwardedRemoteAddrConfig {
    #[serde(default = "default_max_trusted_index")]
    pub max_trusted_index: i64,
    pub sources: Vec<String>,
}

impl PredicateConfig for XForwardedRemoteAddrConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_trusted_index <= 0 {
            return Err(format!(
                "maxTrustedIndex must be greater than 0, got {}",
                self.max_trusted_index
            ));
        }
        if self.sources.is_empty() {
            return Err("sources must not be empty".into());
        }
        Ok(())
    }
}

/// Client address within any of the configured subnets.
#[derive(Debug)]
pub struct RemoteAddrPredicate {
    sources: Vec<SubnetRule>,
    resolver: Arc<dyn RemoteAddressResolver>,
}

impl RemoteAddrPredicate {
    pub fn new(sources: Vec<SubnetRule>, resolver: Arc<dyn RemoteAddressResolver>) -> Self {
        Self { sources, resolver }
    }
}

#[async_trait]
impl RoutePredicate for RemoteAddrPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        let Some(addr) = self.resolver.resolve(exchange) else {
            return Ok(false);
        };
        let matched = self.sources.iter().any(|rule| rule.contains(addr));
        tracing::trace!(remote = %addr, matched, "Remote address");
        Ok(matched)
    }

    fn config(&self) -> Value {
        serde_json::json!({
            "sources": self.sources.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for RemoteAddrPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<_> = self.sources.iter().map(|s| s.to_string()).collect();
        write!(f, "RemoteAddrs: {:?}", sources)
    }
}

pub struct RemoteAddrFactory;

impl PredicateFactory for RemoteAddrFactory {
    fn kind(&self) -> PredicateKind {
        PredicateKind::RemoteAddr
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        &["sources"]
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: RemoteAddrConfig = bind(self.kind(), args)?;
        let sources = parse_sources(self.kind(), &config.sources)?;
        Ok(Predicate::leaf(RemoteAddrPredicate::new(
            sources,
            Arc::new(SocketAddressResolver),
        )))
    }
}

pub struct XForwardedRemoteAddrFactory;

impl PredicateFactory for XForwardedRemoteAddrFactory {
    fn kind(&self) -> PredicateKind {
        PredicateKind::XForwardedRemoteAddr
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        &["sources"]
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: XForwardedRemoteAddrConfig = bind(self.kind(), args)?;
        let resolver = XForwardedRemoteAddressResolver::max_trusted_index(config.max_trusted_index)
            .map_err(|e| PredicateError::invalid(self.kind().name(), e))?;
        let sources = parse_sources(self.kind(), &config.sources)?;
        tracing::debug!(
            max_trusted_index = config.max_trusted_index,
            sources = ?config.sources,
            "Applying XForwardedRemoteAddr route predicate"
        );
        Ok(Predicate::leaf(RemoteAddrPredicate::new(sources, Arc::new(resolver))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn exchange(peer: &str, forwarded: Option<&str>) -> Exchange {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        Exchange::new(builder.body(Body::empty()).unwrap(), Some(peer.parse().unwrap()))
    }

    #[tokio::test]
    async fn test_remote_addr_uses_peer() {
        let p = RemoteAddrFactory
            .apply(&json!({"sources": ["192.168.0.0/16", "10.0.0.1"]}))
            .unwrap();
        assert!(p.evaluate(&mut exchange("192.168.3.4:80", None)).await.unwrap());
        assert!(p.evaluate(&mut exchange("10.0.0.1:80", None)).await.unwrap());
        assert!(!p.evaluate(&mut exchange("10.0.0.2:80", None)).await.unwrap());
        // Forwarded headers are ignored by the plain variant.
        assert!(!p
            .evaluate(&mut exchange("10.0.0.2:80", Some("10.0.0.1")))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_forwarded_variant() {
        let p = XForwardedRemoteAddrFactory
            .apply(&json!({"sources": ["1.1.1.1"], "maxTrustedIndex": 3}))
            .unwrap();
        let mut ex = exchange("10.0.0.2:80", Some("1.1.1.1, 2.2.2.2, 3.3.3.3"));
        assert!(p.evaluate(&mut ex).await.unwrap());

        let default_index = XForwardedRemoteAddrFactory
            .apply(&json!({"sources": ["3.3.3.3"]}))
            .unwrap();
        assert!(default_index.evaluate(&mut ex).await.unwrap());
    }

    #[test]
    fn test_invalid_config() {
        assert!(RemoteAddrFactory.apply(&json!({"sources": []})).is_err());
        assert!(RemoteAddrFactory.apply(&json!({"sources": ["nope"]})).is_err());
        assert!(XForwardedRemoteAddrFactory
            .apply(&json!({"sources": ["1.1.1.1"], "maxTrustedIndex": 0}))
            .is_err());
    }
}
