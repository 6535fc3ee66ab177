use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lumen_db::models::status::GenerationStatus;
use lumen_db::repositories::GenerationRepo;
use lumen_orchestrator::pg::{PgAssetPublisher, PgCreditLedger, PgJobStore};
use lumen_orchestrator::{GenerationOrchestrator, OrchestratorConfig, RecoverySweeper};
use lumen_promptchan::{PromptchanClient, ProviderConfig};
use lumen_storage::{R2ArtifactStore, StorageConfig};
use lumen_worker::JobDispatcher;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumen_worker=debug,lumen_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let provider_config = ProviderConfig::from_env().expect("Provider configuration invalid");
    let storage_config = StorageConfig::from_env().expect("Storage configuration invalid");
    let orchestrator_config = OrchestratorConfig::from_env();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = lumen_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    lumen_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    lumen_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // Backlog snapshot: pending jobs the dispatcher will pick up, and
    // processing rows left behind by a previous run for the sweeper.
    let pending = GenerationRepo::list_by_status(&pool, GenerationStatus::Pending)
        .await
        .expect("Failed to query job backlog");
    let in_flight = GenerationRepo::list_by_status(&pool, GenerationStatus::Processing)
        .await
        .expect("Failed to query job backlog");
    tracing::info!(
        pending = pending.len(),
        processing = in_flight.len(),
        "Job backlog at startup",
    );

    // --- Collaborators ---
    let provider = Arc::new(PromptchanClient::new(provider_config));
    let store = Arc::new(R2ArtifactStore::new(storage_config).await);
    let jobs = Arc::new(PgJobStore::new(pool.clone()));

    let orchestrator = Arc::new(GenerationOrchestrator::new(
        provider,
        store,
        jobs.clone(),
        Arc::new(PgCreditLedger::new(pool.clone())),
        Arc::new(PgAssetPublisher::new(pool.clone())),
        orchestrator_config.clone(),
    ));

    // --- Background loops ---
    let cancel = CancellationToken::new();

    let dispatcher = JobDispatcher::new(pool.clone(), Arc::clone(&orchestrator));
    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel).await;
    });

    let sweeper = RecoverySweeper::new(jobs, Arc::clone(&orchestrator), orchestrator_config);
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    tracing::info!("Worker started (dispatcher + recovery sweeper)");

    // --- Shutdown ---
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping loops");
    cancel.cancel();

    let _ = dispatcher_handle.await;
    let _ = sweeper_handle.await;
    tracing::info!("Worker stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
