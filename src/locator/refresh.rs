//! Two-stage refresh pipeline.
//!
//! # Data Flow
//! ```text
//! RefreshHandle::refresh() / apply(definitions)
//!     → mpsc command
//!     → definitions task: CachingDefinitionLocator refresh/apply
//!         → DefinitionsChanged (carries the stored sequence), DefinitionsRefreshed
//!         → watch<seq>
//!     → routes task: CachingRouteLocator refresh
//!         → RoutesChanged, RoutesRefreshed
//!         → watch<RouteGeneration>
//! ```
//!
//! # Design Decisions
//! - Definition commands run one at a time in arrival order
//! - The routes stage reads a `watch` channel, so definition changes that
//!   arrive while a route refresh runs collapse into one follow-up refresh
//! - Both tasks stop on shutdown or when every handle is dropped

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::RefreshError;
use crate::lifecycle::shutdown::Shutdown;
use crate::locator::definition::CachingDefinitionLocator;
use crate::locator::events::{EventBus, GatewayEvent};
use crate::locator::route::CachingRouteLocator;
use crate::observability::metrics::{self, RefreshStage};
use crate::routing::definition::RouteDefinition;

type Reply = oneshot::Sender<Result<u64, RefreshError>>;

enum RefreshCommand {
    Refresh(Option<Reply>),
    Apply(Vec<RouteDefinition>, Option<Reply>),
}

/// Outcome of the latest route refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeneration {
    /// Definition sequence the refresh was triggered by.
    pub seq: u64,
    /// Route count, or the error that kept the previous table.
    pub result: Result<usize, String>,
}

/// Caches and event bus wired into the two refresh tasks.
pub struct RefreshPipeline {
    definitions: Arc<CachingDefinitionLocator>,
    routes: Arc<CachingRouteLocator>,
    events: EventBus,
}

impl RefreshPipeline {
    pub fn new(
        definitions: Arc<CachingDefinitionLocator>,
        routes: Arc<CachingRouteLocator>,
        events: EventBus,
    ) -> Self {
        Self {
            definitions,
            routes,
            events,
        }
    }

    /// Start both tasks on the current runtime.
    pub fn spawn(self, shutdown: &Shutdown) -> RefreshHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (seq_tx, seq_rx) = watch::channel(0u64);
        let (generation_tx, generation_rx) = watch::channel(RouteGeneration {
            seq: 0,
            result: Ok(0),
        });

        tokio::spawn(definitions_task(
            self.definitions,
            self.events.clone(),
            command_rx,
            seq_tx,
            shutdown.clone(),
        ));
        tokio::spawn(routes_task(
            self.routes,
            self.events,
            seq_rx,
            generation_tx,
            shutdown.clone(),
        ));

        RefreshHandle {
            commands: command_tx,
            generations: generation_rx,
        }
    }
}

async fn definitions_task(
    definitions: Arc<CachingDefinitionLocator>,
    events: EventBus,
    mut commands: mpsc::UnboundedReceiver<RefreshCommand>,
    seq_tx: watch::Sender<u64>,
    shutdown: Shutdown,
) {
    let mut seq = 0u64;
    loop {
        let command = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = shutdown.wait() => break,
        };

        let (result, reply) = match command {
            RefreshCommand::Refresh(reply) => (definitions.refresh().await, reply),
            RefreshCommand::Apply(list, reply) => (Ok(definitions.apply(list).await), reply),
        };

        let outcome = match result {
            Ok(stored) => {
                seq += 1;
                tracing::info!(seq, count = stored.len(), "Route definitions refreshed");
                events.publish(GatewayEvent::DefinitionsChanged {
                    seq,
                    definitions: stored,
                });
                events.publish(GatewayEvent::DefinitionsRefreshed {
                    seq,
                    success: true,
                    error: None,
                });
                metrics::record_refresh(RefreshStage::Definitions, true);
                seq_tx.send_replace(seq);
                Ok(seq)
            }
            Err(e) => {
                tracing::error!(error = %e, "Route definition refresh failed, keeping cached definitions");
                events.publish(GatewayEvent::DefinitionsRefreshed {
                    seq,
                    success: false,
                    error: Some(e.to_string()),
                });
                metrics::record_refresh(RefreshStage::Definitions, false);
                Err(RefreshError::Definitions(e.to_string()))
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }
    tracing::debug!("Definition refresh task stopped");
}

async fn routes_task(
    routes: Arc<CachingRouteLocator>,
    events: EventBus,
    mut seq_rx: watch::Receiver<u64>,
    generation_tx: watch::Sender<RouteGeneration>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            changed = seq_rx.changed() => if changed.is_err() { break },
            _ = shutdown.wait() => break,
        }
        let seq = *seq_rx.borrow_and_update();

        let result = match routes.refresh().await {
            Ok(count) => {
                tracing::info!(seq, count, "Routes refreshed");
                events.publish(GatewayEvent::RoutesChanged { seq, count });
                events.publish(GatewayEvent::RoutesRefreshed {
                    seq,
                    success: true,
                    error: None,
                });
                metrics::record_refresh(RefreshStage::Routes, true);
                metrics::record_route_count(count);
                Ok(count)
            }
            Err(e) => {
                tracing::error!(seq, error = %e, "Route refresh failed, keeping cached routes");
                events.publish(GatewayEvent::RoutesRefreshed {
                    seq,
                    success: false,
                    error: Some(e.to_string()),
                });
                metrics::record_refresh(RefreshStage::Routes, false);
                Err(e.to_string())
            }
        };
        generation_tx.send_replace(RouteGeneration { seq, result });
    }
    tracing::debug!("Route refresh task stopped");
}

/// Cloneable trigger for the refresh pipeline.
#[derive(Clone)]
pub struct RefreshHandle {
    commands: mpsc::UnboundedSender<RefreshCommand>,
    generations: watch::Receiver<RouteGeneration>,
}

impl RefreshHandle {
    /// Re-fetch definitions from their sources. Does not wait.
    pub fn refresh(&self) -> Result<(), RefreshError> {
        self.send(RefreshCommand::Refresh(None))
    }

    /// Replace the cached definitions. Does not wait.
    pub fn apply(&self, definitions: Vec<RouteDefinition>) -> Result<(), RefreshError> {
        self.send(RefreshCommand::Apply(definitions, None))
    }

    /// Re-fetch definitions and wait until the route table reflects them.
    /// Returns the route count.
    pub async fn refresh_and_wait(&self) -> Result<usize, RefreshError> {
        self.send_and_wait(RefreshCommand::Refresh).await
    }

    /// Replace the cached definitions and wait for the route table.
    pub async fn apply_and_wait(
        &self,
        definitions: Vec<RouteDefinition>,
    ) -> Result<usize, RefreshError> {
        self.send_and_wait(|reply| RefreshCommand::Apply(definitions, reply))
            .await
    }

    /// Outcome of the most recent route refresh.
    pub fn current(&self) -> RouteGeneration {
        self.generations.borrow().clone()
    }

    async fn send_and_wait(
        &self,
        command: impl FnOnce(Option<Reply>) -> RefreshCommand,
    ) -> Result<usize, RefreshError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(Some(tx)))?;
        let seq = rx.await.map_err(|_| RefreshError::Closed)??;
        let mut generations = self.generations.clone();
        let generation = generations
            .wait_for(|g| g.seq >= seq)
            .await
            .map_err(|_| RefreshError::Closed)?
            .clone();
        generation.result.map_err(RefreshError::Routes)
    }

    fn send(&self, command: RefreshCommand) -> Result<(), RefreshError> {
        self.commands.send(command).map_err(|_| RefreshError::Closed)
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("current", &*self.generations.borrow())
            .finish()
    }
}
