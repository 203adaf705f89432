//! HTTP server wiring
//!
//! Builds the shared application state, spawns the background workers
//! (session-lock sweeper, job workers), and mounts the versioned API.

pub mod middleware;
pub mod routes;

use crate::config::Config;
use crate::core::analytics::AnalyticsService;
use crate::core::jobs::JobWorker;
use crate::core::orchestrator::Orchestrator;
use crate::core::pipeline::MessagePipeline;
use crate::core::providers::AdapterCatalog;
use crate::core::session_lock::{self, SessionLockMap};
use crate::core::tools::ToolRegistry;
use crate::core::voice::VoiceService;
use crate::storage::Database;
use crate::utils::error::Result;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything handlers share
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub locks: Arc<SessionLockMap>,
    pub tools: Arc<ToolRegistry>,
    pub pipeline: Arc<MessagePipeline>,
    pub analytics: AnalyticsService,
    pub voice: VoiceService,
}

impl AppState {
    /// Wire the full service graph against a connected database
    pub fn build(config: Config, db: Database) -> Self {
        let locks = Arc::new(SessionLockMap::default());
        let tools = Arc::new(ToolRegistry::with_builtin());
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(AdapterCatalog::production())));
        let pipeline = Arc::new(MessagePipeline::new(
            db.clone(),
            Arc::clone(&locks),
            Arc::clone(&tools),
            orchestrator,
        ));
        let analytics = AnalyticsService::new(db.clone());
        let voice = VoiceService::new(db.clone(), &config.voice);

        Self {
            config,
            db,
            locks,
            tools,
            pipeline,
            analytics,
            voice,
        }
    }
}

/// Connect, migrate, spawn workers, and serve until shutdown
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;

    let state = AppState::build(config.clone(), db);

    session_lock::spawn_sweeper(Arc::clone(&state.locks), Duration::from_secs(10));
    for instance in 0..config.jobs.worker_count {
        let worker = Arc::new(JobWorker::new(
            state.db.clone(),
            Arc::clone(&state.pipeline),
            &config.jobs,
            instance,
        ));
        tokio::spawn(worker.run());
    }

    let data = web::Data::new(state);
    let bind_addr = (config.server.host.clone(), config.server.port);
    info!(host = %bind_addr.0, port = bind_addr.1, "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware::CorrelationId)
            .wrap(Cors::permissive())
            .configure(routes::configure)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
