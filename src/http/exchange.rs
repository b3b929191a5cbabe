//! Request/response exchange carried through predicates and plugins.
//!
//! # Responsibilities
//! - Own the inbound request and the response being produced for it
//! - Expose the socket peer address to address resolvers
//! - Store request-scoped facts recorded during matching
//!
//! # Design Decisions
//! - Facts live in the request's `Extensions` as newtypes, the same way
//!   middleware attaches context to requests
//! - The response starts as an empty `200 OK`; plugins mutate it in place
//! - `completed` marks a response a plugin finished on its own (e.g. redirect)

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::routing::route::Route;

/// Identity of the route whose predicate is currently being evaluated.
///
/// Set before every predicate test, independent of its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRoute(pub String);

/// Pattern matched by the Path predicate, with the route it matched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPath {
    pub pattern: String,
    pub route_identity: Option<String>,
}

/// Variables extracted by path and host patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriTemplateVariables(pub HashMap<String, String>);

/// Route selected by the dispatcher.
#[derive(Debug, Clone)]
pub struct MatchedRoute(pub Arc<Route>);

/// A `{name}` placeholder had no value in the template variables.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no value for URI template variable '{0}'")]
pub struct MissingVariable(pub String);

/// One request travelling through the gateway.
#[derive(Debug)]
pub struct Exchange {
    request: Request<Body>,
    response: Response<Body>,
    remote_addr: Option<SocketAddr>,
    completed: bool,
}

impl Exchange {
    /// Wrap an inbound request. `remote_addr` is the socket peer, if known.
    pub fn new(request: Request<Body>, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            request,
            response: Response::new(Body::empty()),
            remote_addr,
            completed: false,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    pub fn response(&self) -> &Response<Body> {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response<Body> {
        &mut self.response
    }

    /// Socket-level peer address.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Mark the response as finished by a plugin.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Replace the response status and body, then mark it finished.
    pub fn complete_with(&mut self, status: StatusCode, body: impl Into<Body>) {
        *self.response.status_mut() = status;
        *self.response.body_mut() = body.into();
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    // --- Request facts ---

    pub fn candidate_route(&self) -> Option<&str> {
        self.request
            .extensions()
            .get::<CandidateRoute>()
            .map(|c| c.0.as_str())
    }

    pub fn set_candidate_route(&mut self, identity: &str) {
        self.request
            .extensions_mut()
            .insert(CandidateRoute(identity.to_string()));
    }

    pub fn matched_path(&self) -> Option<&MatchedPath> {
        self.request.extensions().get::<MatchedPath>()
    }

    /// Record the matched path pattern, tagged with the current candidate route.
    pub fn set_matched_path(&mut self, pattern: &str) {
        let route_identity = self.candidate_route().map(str::to_string);
        self.request.extensions_mut().insert(MatchedPath {
            pattern: pattern.to_string(),
            route_identity,
        });
    }

    pub fn uri_template_variables(&self) -> Option<&HashMap<String, String>> {
        self.request
            .extensions()
            .get::<UriTemplateVariables>()
            .map(|v| &v.0)
    }

    pub fn uri_variable(&self, name: &str) -> Option<&str> {
        self.uri_template_variables()
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    /// Merge variables into the existing map; new values win on key collisions.
    pub fn put_uri_template_variables(&mut self, variables: HashMap<String, String>) {
        let extensions = self.request.extensions_mut();
        match extensions.get_mut::<UriTemplateVariables>() {
            Some(existing) => existing.0.extend(variables),
            None => {
                extensions.insert(UriTemplateVariables(variables));
            }
        }
    }

    pub fn matched_route(&self) -> Option<&Arc<Route>> {
        self.request
            .extensions()
            .get::<MatchedRoute>()
            .map(|m| &m.0)
    }

    pub fn set_matched_route(&mut self, route: Arc<Route>) {
        self.request.extensions_mut().insert(MatchedRoute(route));
    }

    /// Drop every fact recorded while looking for a route.
    pub fn clear_match_facts(&mut self) {
        let extensions = self.request.extensions_mut();
        extensions.remove::<MatchedRoute>();
        extensions.remove::<MatchedPath>();
        extensions.remove::<CandidateRoute>();
        extensions.remove::<UriTemplateVariables>();
    }

    /// Short description for log lines.
    pub fn describe(&self) -> String {
        format!("Request: {} {}", self.request.method(), self.request.uri())
    }

    /// Expand `{name}` placeholders from the URI template variables.
    pub fn expand(&self, template: &str) -> Result<String, MissingVariable> {
        if !template.contains('{') {
            return Ok(template.to_string());
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                // Unbalanced brace, keep the remainder verbatim.
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            let value = self
                .uri_variable(name)
                .ok_or_else(|| MissingVariable(name.to_string()))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Consume the exchange, yielding the response.
    pub fn into_response(self) -> Response<Body> {
        self.response
    }
}
