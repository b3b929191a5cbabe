//! Refresh signals.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::routing::definition::RouteDefinition;

/// Something observable happened in the refresh pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A new definition sequence was cached; `definitions` is that sequence.
    DefinitionsChanged {
        seq: u64,
        definitions: Arc<Vec<RouteDefinition>>,
    },
    /// Result of a definition refresh.
    DefinitionsRefreshed {
        seq: u64,
        success: bool,
        error: Option<String>,
    },
    /// A new route table was cached.
    RoutesChanged { seq: u64, count: usize },
    /// Result of a route refresh.
    RoutesRefreshed {
        seq: u64,
        success: bool,
        error: Option<String>,
    },
    /// A predicate was bound for a route.
    PredicateArgsObserved { route_identity: String, args: Value },
}

/// Fan-out of [`GatewayEvent`]s to any number of subscribers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: GatewayEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
