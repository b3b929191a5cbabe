//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Perform the initial refresh before any traffic is served
//! - Start background tasks (refresh pipeline, file watcher, signals, admin)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including the first refresh
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use chrono::Utc;
use notify::RecommendedWatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::schema::GatewayConfig;
use crate::config::watcher::RouteFileWatcher;
use crate::error::GatewayResult;
use crate::http::server::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::locator::definition::{
    CachingDefinitionLocator, CompositeDefinitionLocator, FileDefinitionSource,
    InMemoryDefinitionSource,
};
use crate::locator::events::EventBus;
use crate::locator::refresh::{RefreshHandle, RefreshPipeline};
use crate::locator::route::{CachingRouteLocator, CompositeRouteLocator, DefaultRouteLocator};
use crate::locator::{RouteDefinitionLocator, RouteLocator};
use crate::plugin::{CapableSwitchManager, PluginLoader};
use crate::predicate::PredicateFactoryRegistry;
use crate::routing::dispatcher::Dispatcher;

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    shutdown: Shutdown,
    loader: Arc<PluginLoader>,
    routes: Arc<CachingRouteLocator>,
    dispatcher: Arc<Dispatcher>,
    refresh: RefreshHandle,
    watcher: Option<RecommendedWatcher>,
}

impl Gateway {
    /// Wire every component from `config` and load the first route table.
    pub async fn bootstrap(config: GatewayConfig) -> GatewayResult<Self> {
        Self::bootstrap_with(config, |_| {}).await
    }

    /// Like [`bootstrap`](Self::bootstrap), letting the caller register
    /// host-linked plugins before the plugin table is loaded.
    pub async fn bootstrap_with(
        config: GatewayConfig,
        register: impl FnOnce(&PluginLoader),
    ) -> GatewayResult<Self> {
        let shutdown = Shutdown::new();
        let events = EventBus::default();

        // 1. Plugins
        let switches = Arc::new(CapableSwitchManager::new());
        let loader = Arc::new(PluginLoader::new(&config.plugins, switches.clone()));
        register(&loader);
        loader.reload()?;

        // 2. Predicates
        let registry = Arc::new(PredicateFactoryRegistry::with_defaults());

        // 3. Definition pipeline
        let mut sources = CompositeDefinitionLocator::default();
        sources.push(Arc::new(InMemoryDefinitionSource::new(config.routes.clone())));
        for path in &config.route_files {
            sources.push(Arc::new(FileDefinitionSource::new(path)));
        }
        let definitions = Arc::new(CachingDefinitionLocator::new(Arc::new(sources)));

        // 4. Route pipeline
        let cached_definitions: Arc<dyn RouteDefinitionLocator> = definitions.clone();
        let builder: Arc<dyn RouteLocator> = Arc::new(
            DefaultRouteLocator::new(cached_definitions, registry, loader.clone(), events.clone())
                .strict(config.plugins.strict),
        );
        let routes = Arc::new(CachingRouteLocator::new(Arc::new(
            CompositeRouteLocator::new(vec![builder]),
        )));

        // 5. Refresh tasks and the first table
        let refresh = RefreshPipeline::new(definitions.clone(), routes.clone(), events.clone())
            .spawn(&shutdown);
        let count = refresh.refresh_and_wait().await?;
        tracing::info!(routes = count, "Initial route table loaded");

        // 6. Triggers
        let watcher = if config.refresh.watch_route_files && !config.route_files.is_empty() {
            let watcher = RouteFileWatcher::new(
                &config.route_files,
                Duration::from_secs(config.refresh.poll_interval_secs),
                refresh.clone(),
            );
            Some(watcher.run()?)
        } else {
            None
        };

        let dispatcher = Arc::new(Dispatcher::new(routes.clone(), switches));

        Ok(Self {
            config,
            shutdown,
            loader,
            routes,
            dispatcher,
            refresh,
            watcher,
        })
    }

    /// Serve gateway traffic on `listener` (and the admin API, if enabled)
    /// until shutdown.
    pub async fn serve(self, listener: TcpListener) -> GatewayResult<()> {
        spawn_signal_handler(self.shutdown.clone(), self.refresh.clone());

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let state = AdminState {
                api_key: Arc::from(self.config.admin.api_key.as_str()),
                routes: self.routes.clone(),
                loader: self.loader.clone(),
                refresh: self.refresh.clone(),
                started_at: Utc::now(),
            };
            let app = setup_admin_router(state);
            let shutdown = self.shutdown.clone();
            tracing::info!(address = %self.config.admin.bind_address, "Admin API starting");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move { shutdown.wait().await })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let server = HttpServer::new(self.dispatcher.clone(), &self.config.timeouts);
        let result = server.run(listener, self.shutdown.clone()).await;

        // Stop background tasks even when the server exits on its own.
        self.shutdown.trigger();
        drop(self.watcher);
        result?;
        Ok(())
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    pub fn routes(&self) -> &Arc<CachingRouteLocator> {
        &self.routes
    }

    pub fn refresh(&self) -> &RefreshHandle {
        &self.refresh
    }
}
