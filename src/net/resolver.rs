//! Remote address resolvers.
//!
//! # Forwarded-chain algorithm
//! ```text
//! X-Forwarded-For: client, proxy1, proxy2        (socket peer = proxy3)
//!                  ↑ idx 3  ↑ idx 2  ↑ idx 1
//! ```
//! Each proxy appends the address it received the request from, so the
//! rightmost entry is the one written by the proxy closest to us. With
//! `max_trusted_index = n`, the entry at reversed index `min(len, n) - 1`
//! is returned. Entries further left could have been forged by the client.

use axum::http::HeaderName;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::http::exchange::Exchange;

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("maxTrustedIndex must be greater than 0, got {0}")]
    InvalidTrustedIndex(i64),
}

/// Determines the client address of a request.
pub trait RemoteAddressResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, exchange: &Exchange) -> Option<IpAddr>;
}

/// Uses the socket-level peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketAddressResolver;

impl RemoteAddressResolver for SocketAddressResolver {
    fn resolve(&self, exchange: &Exchange) -> Option<IpAddr> {
        exchange.remote_addr().map(|addr| addr.ip())
    }
}

/// Uses `X-Forwarded-For`, trusting a bounded number of proxy hops.
#[derive(Debug, Clone, Copy)]
pub struct XForwardedRemoteAddressResolver {
    max_trusted_index: usize,
    fallback: SocketAddressResolver,
}

impl XForwardedRemoteAddressResolver {
    /// Trust every hop: always the leftmost (first) entry.
    pub fn trust_all() -> Self {
        Self {
            max_trusted_index: usize::MAX,
            fallback: SocketAddressResolver,
        }
    }

    /// Trust at most `max_trusted_index` hops from the right.
    pub fn max_trusted_index(max_trusted_index: i64) -> Result<Self, ResolverError> {
        if max_trusted_index <= 0 {
            return Err(ResolverError::InvalidTrustedIndex(max_trusted_index));
        }
        Ok(Self {
            max_trusted_index: usize::try_from(max_trusted_index).unwrap_or(usize::MAX),
            fallback: SocketAddressResolver,
        })
    }

    /// The forwarded hops, or `None` when the header is absent, empty or repeated.
    fn forwarded_hops(exchange: &Exchange) -> Option<Vec<String>> {
        let mut headers = exchange.request().headers().get_all(&X_FORWARDED_FOR).iter();
        let value = headers.next()?;
        if headers.next().is_some() {
            tracing::warn!(
                "Multiple X-Forwarded-For headers found, discarding all. {}",
                exchange.describe()
            );
            return None;
        }

        let value = value.to_str().ok()?;
        let hops: Vec<String> = value
            .split(',')
            .map(|hop| hop.trim().to_string())
            .filter(|hop| !hop.is_empty())
            .collect();
        if hops.is_empty() {
            return None;
        }
        Some(hops)
    }

    /// The hop selected by the trust index, before address parsing.
    pub fn select_hop(&self, exchange: &Exchange) -> Option<String> {
        let mut hops = Self::forwarded_hops(exchange)?;
        hops.reverse();
        let index = hops.len().min(self.max_trusted_index) - 1;
        hops.into_iter().nth(index)
    }
}

fn parse_hop(hop: &str) -> Option<IpAddr> {
    hop.parse::<IpAddr>()
        .or_else(|_| hop.parse::<SocketAddr>().map(|s| s.ip()))
        .ok()
}

impl RemoteAddressResolver for XForwardedRemoteAddressResolver {
    fn resolve(&self, exchange: &Exchange) -> Option<IpAddr> {
        match self.select_hop(exchange) {
            Some(hop) => {
                let addr = parse_hop(&hop);
                if addr.is_none() {
                    tracing::debug!(hop = %hop, "Unparsable X-Forwarded-For entry");
                }
                addr
            }
            None => self.fallback.resolve(exchange),
        }
    }
}
