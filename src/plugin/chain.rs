//! Index-based plugin chain.
//!
//! A chain value points at the next plugin to run. Running plugin `i` hands it
//! a chain pointing at `i + 1`; the plugin reads its own configuration through
//! that chain, which is why `config` looks one position back.

use serde::de::DeserializeOwned;

use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::plugin::switch::CapableSwitchManager;
use crate::plugin::PluginInstance;

/// Continuation over a route's plugin list.
#[derive(Clone, Copy)]
pub struct PluginChain<'a> {
    plugins: &'a [PluginInstance],
    index: usize,
    switches: &'a CapableSwitchManager,
}

impl<'a> PluginChain<'a> {
    /// A chain positioned before the first plugin.
    pub fn new(plugins: &'a [PluginInstance], switches: &'a CapableSwitchManager) -> Self {
        Self {
            plugins,
            index: 0,
            switches,
        }
    }

    /// Position of the next plugin to run.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Run the plugin at the current position. Past the end this does nothing.
    pub async fn proceed(self, exchange: &mut Exchange) -> Result<(), PluginError> {
        let Some(instance) = self.plugins.get(self.index) else {
            return Ok(());
        };
        let next = PluginChain {
            index: self.index + 1,
            ..self
        };
        tracing::trace!(plugin = %instance.identity(), index = self.index, "Running plugin");
        instance.plugin().handle(exchange, next).await
    }

    /// The instance whose configuration this chain exposes.
    pub fn current(&self) -> Option<&'a PluginInstance> {
        self.index
            .checked_sub(1)
            .and_then(|position| self.plugins.get(position))
    }

    /// Decode the configuration bound to the plugin that received this chain.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        let instance = self.current().ok_or(PluginError::MissingConfig(self.index))?;
        serde_json::from_str(instance.config()).map_err(|e| PluginError::InvalidConfig {
            plugin: instance.name().to_string(),
            reason: e.to_string(),
        })
    }

    /// Process-wide switch registry.
    pub fn switches(&self) -> &'a CapableSwitchManager {
        self.switches
    }
}

impl std::fmt::Debug for PluginChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("index", &self.index)
            .field("len", &self.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Plugin;
    use crate::predicate::testing::exchange;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    /// Records its label, then continues or stops.
    struct Step {
        label: &'static str,
        proceed: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Deserialize)]
    struct StepConfig {
        tag: String,
    }

    #[async_trait]
    impl Plugin for Step {
        async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
            let config: StepConfig = chain.config()?;
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, config.tag));
            if self.proceed {
                chain.proceed(exchange).await
            } else {
                Ok(())
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl Plugin for Broken {
        async fn handle(&self, _exchange: &mut Exchange, _chain: PluginChain<'_>) -> Result<(), PluginError> {
            Err(PluginError::execution("broken", "always fails"))
        }
    }

    fn step(label: &'static str, proceed: bool, log: &Arc<Mutex<Vec<String>>>) -> PluginInstance {
        let plugin = Arc::new(Step {
            label,
            proceed,
            log: log.clone(),
        });
        PluginInstance::new(label, label, plugin, format!(r#"{{"tag":"{}"}}"#, label.to_lowercase()))
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![step("A", true, &log), step("B", false, &log), step("C", true, &log)];
        let switches = CapableSwitchManager::new();

        let mut ex = exchange("/");
        PluginChain::new(&plugins, &switches).proceed(&mut ex).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A:a", "B:b"]);
    }

    #[tokio::test]
    async fn test_full_chain_and_past_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![step("A", true, &log), step("B", true, &log)];
        let switches = CapableSwitchManager::new();

        let mut ex = exchange("/");
        PluginChain::new(&plugins, &switches).proceed(&mut ex).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["A:a", "B:b"]);

        PluginChain::new(&[], &switches).proceed(&mut ex).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![
            step("A", true, &log),
            PluginInstance::new("Broken", "broken", Arc::new(Broken), "{}"),
            step("C", true, &log),
        ];
        let switches = CapableSwitchManager::new();

        let mut ex = exchange("/");
        let err = PluginChain::new(&plugins, &switches)
            .proceed(&mut ex)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Execution { .. }));
        assert_eq!(*log.lock().unwrap(), vec!["A:a"]);
    }

    #[test]
    fn test_config_reads_previous_position() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![step("A", true, &log)];
        let switches = CapableSwitchManager::new();

        let head = PluginChain::new(&plugins, &switches);
        assert!(matches!(
            head.config::<StepConfig>(),
            Err(PluginError::MissingConfig(0))
        ));

        let after_a = PluginChain { index: 1, ..head };
        assert_eq!(after_a.config::<StepConfig>().unwrap().tag, "a");
    }

    #[test]
    fn test_invalid_config() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![PluginInstance::new(
            "A",
            "a",
            Arc::new(Step {
                label: "A",
                proceed: true,
                log,
            }),
            "not json",
        )];
        let switches = CapableSwitchManager::new();
        let chain = PluginChain {
            index: 1,
            ..PluginChain::new(&plugins, &switches)
        };
        assert!(matches!(
            chain.config::<StepConfig>(),
            Err(PluginError::InvalidConfig { .. })
        ));
    }
}
