// Service wiring: storage backend, handler registry and worker pool

use std::sync::Arc;

use anyhow::{Context, Result};
use docket_anthropic::AnthropicGenerator;
use docket_core::{HandlerRegistry, TextGenerator};
use docket_durable::{
    InMemoryStore, PostgresStore, StatusStore, TaskQueue, WorkerPool, WorkerPoolError,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::service::TaskService;

/// Everything the server process runs besides the HTTP listener
pub struct TaskRuntime {
    pub service: Arc<TaskService>,
    pub pool: WorkerPool,
}

impl TaskRuntime {
    /// Build the runtime described by `config`.
    ///
    /// Uses PostgreSQL (after applying migrations) when `DATABASE_URL` is set,
    /// otherwise an in-memory backend that loses all tasks on exit.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let (queue, status): (Arc<dyn TaskQueue>, Arc<dyn StatusStore>) =
            match &config.database_url {
                Some(url) => {
                    let store = PostgresStore::connect(url, config.database_max_connections)
                        .await
                        .context("Failed to connect to database")?;
                    store.migrate().await.context("Failed to run migrations")?;
                    info!("Using PostgreSQL task store");
                    let store = Arc::new(store);
                    (store.clone(), store)
                }
                None => {
                    warn!("DATABASE_URL not set; using in-memory task store (tasks are lost on restart)");
                    let store = Arc::new(InMemoryStore::new());
                    (store.clone(), store)
                }
            };

        Ok(Self::new(queue, status, Self::registry(config), config))
    }

    /// Assemble a runtime over an existing backend
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        status: Arc<dyn StatusStore>,
        registry: HandlerRegistry,
        config: &ServerConfig,
    ) -> Self {
        let service = Arc::new(TaskService::new(
            Arc::clone(&queue),
            Arc::clone(&status),
            config.retry.clone(),
        ));
        let pool = WorkerPool::new(queue, status, Arc::new(registry), config.worker.clone());
        Self { service, pool }
    }

    /// Handlers for every kind, backed by the primary capability when one is
    /// configured and by the local fallback otherwise
    pub fn registry(config: &ServerConfig) -> HandlerRegistry {
        let primary: Option<Arc<dyn TextGenerator>> = match config.primary.anthropic() {
            Some(anthropic) => match AnthropicGenerator::new(anthropic) {
                Ok(generator) => {
                    info!(model = %config.primary.model, "Primary capability: anthropic");
                    Some(Arc::new(generator))
                }
                Err(e) => {
                    warn!("Primary capability unavailable: {}. Using fallback only.", e);
                    None
                }
            },
            None => {
                warn!(
                    provider = %config.primary.provider,
                    "Primary capability not configured; tasks complete through the fallback"
                );
                None
            }
        };

        HandlerRegistry::generative(primary, config.retry.clone(), config.primary.timeout)
    }

    pub fn start(&self) -> Result<(), WorkerPoolError> {
        self.pool.start()
    }

    /// Drain the worker pool
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        self.pool.shutdown().await
    }
}
