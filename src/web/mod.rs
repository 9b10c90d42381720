//! HTTP interface: pipeline trigger endpoints and job management routes.

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{
    config::Config,
    database::Database,
    pipeline::{OpThrottle, PublishScheduler, QueueDispatcher},
};

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Config,
    pub scheduler: Arc<PublishScheduler>,
    pub dispatcher: Arc<QueueDispatcher>,
    pub throttle: OpThrottle,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
    host: String,
    port: u16,
}

impl WebServer {
    pub fn new(
        config: Config,
        database: Database,
        scheduler: Arc<PublishScheduler>,
        dispatcher: Arc<QueueDispatcher>,
        throttle: OpThrottle,
    ) -> Result<Self> {
        let host = config.web.host.clone();
        let port = config.web.port;
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

        let app = Self::create_router(AppState {
            database,
            config,
            scheduler,
            dispatcher,
            throttle,
        });

        Ok(Self {
            app,
            addr,
            host,
            port,
        })
    }

    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .nest("/api/v1", Self::api_v1_routes())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    fn api_v1_routes() -> Router<AppState> {
        Router::new()
            // Pipeline triggers (bearer-secret protected)
            .route("/triggers/publish", post(handlers::trigger_publish))
            .route("/triggers/queue", post(handlers::trigger_queue))
            // Publish jobs
            .route(
                "/publish-jobs",
                get(handlers::list_publish_jobs).post(handlers::create_publish_job),
            )
            .route(
                "/publish-jobs/:id",
                get(handlers::get_publish_job).delete(handlers::cancel_publish_job),
            )
            .route(
                "/publish-jobs/:id/reprocess",
                post(handlers::reprocess_publish_job),
            )
            // Ingestion queue jobs
            .route(
                "/queue-jobs",
                get(handlers::list_queue_jobs).post(handlers::create_queue_job),
            )
            .route("/queue-jobs/import", post(handlers::import_queue_jobs))
            .route("/queue-jobs/:id", delete(handlers::cancel_queue_job))
            .route(
                "/queue-jobs/:id/reprocess",
                post(handlers::reprocess_queue_job),
            )
            // Account credential registration
            .route(
                "/accounts/tokens",
                post(handlers::register_account_token),
            )
            // Reporting surfaces
            .route("/stats", get(handlers::get_stats))
            .route("/audit", get(handlers::list_audit))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }
}
