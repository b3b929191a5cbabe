//! AddRequestHeader and AddResponseHeader.
//!
//! Values may reference URI template variables, e.g. `tenant-{tenant}`.

use async_trait::async_trait;

use super::{header_pair, NameValueConfig};
use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::plugin::{Plugin, PluginChain};

/// Appends a header to the inbound request.
#[derive(Debug, Default)]
pub struct AddRequestHeader;

#[async_trait]
impl Plugin for AddRequestHeader {
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
        let config: NameValueConfig = chain.config()?;
        let value = exchange
            .expand(&config.value)
            .map_err(|e| PluginError::execution("AddRequestHeader", e))?;
        let (name, value) = header_pair("AddRequestHeader", &config.name, &value)?;
        exchange.request_mut().headers_mut().append(name, value);
        chain.proceed(exchange).await
    }
}

/// Appends a header to the outbound response.
#[derive(Debug, Default)]
pub struct AddResponseHeader;

#[async_trait]
impl Plugin for AddResponseHeader {
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
        let config: NameValueConfig = chain.config()?;
        let value = exchange
            .expand(&config.value)
            .map_err(|e| PluginError::execution("AddResponseHeader", e))?;
        let (name, value) = header_pair("AddResponseHeader", &config.name, &value)?;
        exchange.response_mut().headers_mut().append(name, value);
        chain.proceed(exchange).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::run;
    use super::*;
    use crate::predicate::testing::exchange;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_request_header_expands_and_continues() {
        let mut ex = exchange("/users/5");
        ex.put_uri_template_variables(HashMap::from([("id".into(), "5".into())]));

        let continued = run(
            Arc::new(AddRequestHeader),
            r#"{"name":"X-User","value":"user-{id}"}"#,
            &mut ex,
        )
        .await
        .unwrap();
        assert!(continued);
        assert_eq!(ex.request().headers()["x-user"], "user-5");
    }

    #[tokio::test]
    async fn test_add_response_header_appends() {
        let mut ex = exchange("/");
        ex.response_mut()
            .headers_mut()
            .insert("x-trace", "a".parse().unwrap());

        run(
            Arc::new(AddResponseHeader),
            r#"{"name":"X-Trace","value":"b"}"#,
            &mut ex,
        )
        .await
        .unwrap();
        let values: Vec<_> = ex.response().headers().get_all("x-trace").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_variable_fails() {
        let mut ex = exchange("/");
        let err = run(
            Arc::new(AddRequestHeader),
            r#"{"name":"X-User","value":"{id}"}"#,
            &mut ex,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PluginError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_bad_config() {
        let mut ex = exchange("/");
        let err = run(Arc::new(AddRequestHeader), r#"{"name":"X"}"#, &mut ex)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidConfig { .. }));
    }
}
