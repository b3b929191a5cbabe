//! Request-field predicates: Method, plus Header, Query and Cookie which share
//! one implementation over [`Field`].
//!
//! Regular expressions must match the whole value.

use async_trait::async_trait;
use axum::http::{header, Method};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;
use crate::predicate::registry::{bind, PredicateConfig, PredicateKind, ShortcutType};
use crate::predicate::{Predicate, PredicateFactory, RoutePredicate};

fn full_match(kind: PredicateKind, regexp: &str) -> Result<Regex, PredicateError> {
    Regex::new(&format!("^(?:{})$", regexp)).map_err(|e| PredicateError::invalid(kind.name(), e))
}

fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

// --- Method ---

#[derive(Debug, Clone, Deserialize)]
pub struct MethodConfig {
    pub methods: Vec<String>,
}

impl PredicateConfig for MethodConfig {
    fn validate(&self) -> Result<(), String> {
        if self.methods.is_empty() {
            return Err("methods must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

#[async_trait]
impl RoutePredicate for MethodPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        Ok(self.methods.contains(exchange.request().method()))
    }

    fn config(&self) -> Value {
        serde_json::json!({
            "methods": self.methods.iter().map(Method::as_str).collect::<Vec<_>>(),
        })
    }
}

impl fmt::Display for MethodPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<_> = self.methods.iter().map(Method::as_str).collect();
        write!(f, "Methods: {:?}", methods)
    }
}

pub struct MethodFactory;

impl PredicateFactory for MethodFactory {
    fn kind(&self) -> PredicateKind {
        PredicateKind::Method
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherList
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        &["methods"]
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: MethodConfig = bind(self.kind(), args)?;
        let methods = config
            .methods
            .iter()
            .map(|m| {
                Method::from_str(&m.trim().to_ascii_uppercase())
                    .map_err(|e| PredicateError::invalid(self.kind().name(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Predicate::leaf(MethodPredicate { methods }))
    }
}

// --- Header, Query, Cookie ---

/// Where a named request field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Header,
    Query,
    Cookie,
}

impl Field {
    fn kind(self) -> PredicateKind {
        match self {
            Field::Header => PredicateKind::Header,
            Field::Query => PredicateKind::Query,
            Field::Cookie => PredicateKind::Cookie,
        }
    }

    /// Config key naming the field.
    fn key(self) -> &'static str {
        match self {
            Field::Header => "header",
            Field::Query => "param",
            Field::Cookie => "name",
        }
    }

    /// Every value of the field `name`. Header and cookie values may repeat
    /// across lines, query values across pairs.
    fn values(self, exchange: &Exchange, name: &str) -> Vec<String> {
        let headers = exchange.request().headers();
        match self {
            Field::Header => headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect(),
            Field::Query => exchange
                .request()
                .uri()
                .query()
                .map(|query| {
                    url::form_urlencoded::parse(query.as_bytes())
                        .filter(|(n, _)| n == name)
                        .map(|(_, v)| v.into_owned())
                        .collect()
                })
                .unwrap_or_default(),
            Field::Cookie => headers
                .get_all(header::COOKIE)
                .iter()
                .filter_map(|h| h.to_str().ok())
                .flat_map(|h| h.split(';'))
                .filter_map(|pair| pair.trim().split_once('='))
                .filter(|(n, _)| *n == name)
                .map(|(_, v)| v.trim_matches('"').to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    #[serde(alias = "header", alias = "param")]
    pub name: String,
    #[serde(default)]
    pub regexp: Option<String>,
}

impl PredicateConfig for FieldConfig {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("name", &self.name)
    }
}

/// Present, or with a value fully matching `regexp`.
#[derive(Debug)]
pub struct FieldPredicate {
    field: Field,
    name: String,
    regexp: Option<Regex>,
}

#[async_trait]
impl RoutePredicate for FieldPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        let values = self.field.values(exchange, &self.name);
        let Some(regexp) = &self.regexp else {
            return Ok(!values.is_empty());
        };
        // Blank query values never satisfy a regexp.
        Ok(values
            .iter()
            .filter(|v| self.field != Field::Query || !v.trim().is_empty())
            .any(|v| regexp.is_match(v)))
    }

    fn config(&self) -> Value {
        let mut config = serde_json::Map::new();
        config.insert(self.field.key().into(), Value::String(self.name.clone()));
        config.insert(
            "regexp".into(),
            self.regexp
                .as_ref()
                .map_or(Value::Null, |r| Value::String(r.as_str().to_string())),
        );
        Value::Object(config)
    }
}

impl fmt::Display for FieldPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}={}", self.field.kind(), self.field.key(), self.name)?;
        if let Some(re) = &self.regexp {
            write!(f, " regexp={}", re.as_str())?;
        }
        Ok(())
    }
}

pub struct FieldFactory(pub Field);

impl PredicateFactory for FieldFactory {
    fn kind(&self) -> PredicateKind {
        self.0.kind()
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        match self.0 {
            Field::Header => &["header", "regexp"],
            Field::Query => &["param", "regexp"],
            Field::Cookie => &["name", "regexp"],
        }
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: FieldConfig = bind(self.kind(), args)?;
        if self.0 == Field::Cookie {
            require_non_blank("regexp", config.regexp.as_deref().unwrap_or_default())
                .map_err(|reason| PredicateError::invalid(self.kind().name(), reason))?;
        }
        let regexp = config
            .regexp
            .as_deref()
            .map(|re| full_match(self.kind(), re))
            .transpose()?;
        let name = match self.0 {
            Field::Header => config.name.trim().to_ascii_lowercase(),
            _ => config.name,
        };
        Ok(Predicate::leaf(FieldPredicate {
            field: self.0,
            name,
            regexp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;

    fn request(method: &str, uri: &str, headers: &[(&str, &str)]) -> Exchange {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        Exchange::new(builder.body(Body::empty()).unwrap(), None)
    }

    #[tokio::test]
    async fn test_method_any_of() {
        let p = MethodFactory.apply(&json!({"methods": ["get", "POST"]})).unwrap();
        assert!(p.evaluate(&mut request("GET", "/", &[])).await.unwrap());
        assert!(p.evaluate(&mut request("POST", "/", &[])).await.unwrap());
        assert!(!p.evaluate(&mut request("DELETE", "/", &[])).await.unwrap());

        assert!(MethodFactory.apply(&json!({"methods": []})).is_err());
    }

    #[tokio::test]
    async fn test_header_regexp() {
        let p = FieldFactory(Field::Header)
            .apply(&json!({"header": "X-Request-Id", "regexp": "\\d+"}))
            .unwrap();
        assert!(p
            .evaluate(&mut request("GET", "/", &[("x-request-id", "123")]))
            .await
            .unwrap());
        assert!(!p
            .evaluate(&mut request("GET", "/", &[("x-request-id", "12a")]))
            .await
            .unwrap());
        assert!(!p.evaluate(&mut request("GET", "/", &[])).await.unwrap());
    }

    #[tokio::test]
    async fn test_header_presence() {
        let p = FieldFactory(Field::Header).apply(&json!({"header": "X-Debug"})).unwrap();
        assert!(p
            .evaluate(&mut request("GET", "/", &[("x-debug", "")]))
            .await
            .unwrap());
        assert!(!p.evaluate(&mut request("GET", "/", &[])).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_presence_and_regexp() {
        let present = FieldFactory(Field::Query).apply(&json!({"param": "green"})).unwrap();
        assert!(present
            .evaluate(&mut request("GET", "/?green=", &[]))
            .await
            .unwrap());
        assert!(!present
            .evaluate(&mut request("GET", "/?red=1", &[]))
            .await
            .unwrap());

        let regexp = FieldFactory(Field::Query)
            .apply(&json!({"param": "color", "regexp": "gr.+"}))
            .unwrap();
        assert!(regexp
            .evaluate(&mut request("GET", "/?color=blue&color=green", &[]))
            .await
            .unwrap());
        assert!(!regexp
            .evaluate(&mut request("GET", "/?color=", &[]))
            .await
            .unwrap());
        assert!(!regexp.evaluate(&mut request("GET", "/", &[])).await.unwrap());
    }

    #[tokio::test]
    async fn test_cookie_any_value() {
        let p = FieldFactory(Field::Cookie)
            .apply(&json!({"name": "session", "regexp": "ab.*"}))
            .unwrap();
        assert!(p
            .evaluate(&mut request(
                "GET",
                "/",
                &[("cookie", "theme=dark; session=abc123")]
            ))
            .await
            .unwrap());
        assert!(!p
            .evaluate(&mut request("GET", "/", &[("cookie", "session=xyz")]))
            .await
            .unwrap());

        assert!(FieldFactory(Field::Cookie).apply(&json!({"name": "session", "regexp": ""})).is_err());
    }
}
