mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
#[cfg(test)]
mod testutil;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use service::{
    audit_service::AuditService,
    background_jobs::{start_auto_release_job, start_expiry_job},
    commission_service::CommissionService,
    document_storage::HttpDocumentStorage,
    escrow_service::EscrowService,
    notification_service::NotificationService,
    payment_provider::HttpPaymentCollector,
    reputation_service::ReputationService,
    trust_service::TrustService,
    verification_service::VerificationService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;
use utils::clock::SystemClock;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub verification: Arc<VerificationService>,
    pub trust: Arc<TrustService>,
    pub reputation: Arc<ReputationService>,
    pub escrow: Arc<EscrowService>,
    pub commission: Arc<CommissionService>,
    pub audit: Arc<AuditService>,
    pub notifications: Arc<NotificationService>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;

    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;
    tracing::info!("Connection to the database is successful");

    let db_client = DBClient::new(pool);
    db_client
        .run_migrations()
        .await
        .context("Failed to apply migrations")?;

    let store = Arc::new(db_client);
    let clock = Arc::new(SystemClock);
    let notifications = Arc::new(NotificationService::new(store.clone(), clock.clone()));
    let audit = Arc::new(AuditService::new(store.clone(), clock.clone()));

    let trust = Arc::new(TrustService::new(
        store.clone(),
        clock.clone(),
        config.trust.clone(),
        notifications.clone(),
        audit.clone(),
    ));
    let commission = Arc::new(CommissionService::new(store.clone()));
    let verification = Arc::new(VerificationService::new(
        store.clone(),
        clock.clone(),
        config.verification.clone(),
        Arc::new(HttpDocumentStorage::new(&config)),
        trust.clone(),
        notifications.clone(),
        audit.clone(),
        config.dependency_timeout,
    ));
    let reputation = Arc::new(ReputationService::new(
        store.clone(),
        clock.clone(),
        &config.reputation,
        trust.clone(),
        notifications.clone(),
        audit.clone(),
    ));
    let escrow = Arc::new(EscrowService::new(
        store.clone(),
        clock.clone(),
        config.escrow.clone(),
        commission.clone(),
        Arc::new(HttpPaymentCollector::new(&config)),
        trust.clone(),
        notifications.clone(),
        audit.clone(),
        config.dependency_timeout,
    ));

    let allowed_origins = config
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("ALLOWED_ORIGINS contains an invalid origin")?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    tokio::spawn(start_auto_release_job(
        escrow.clone(),
        config.auto_release_interval,
    ));
    tokio::spawn(start_expiry_job(
        verification.clone(),
        config.expiry_sweep_interval,
    ));

    let app_state = AppState {
        env: config.clone(),
        verification,
        trust,
        reputation,
        escrow,
        commission,
        audit,
        notifications,
    };

    let app = create_router(Arc::new(app_state)).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .context("Failed to bind the listen address")?;

    axum::serve(listener, app).await?;

    Ok(())
}
