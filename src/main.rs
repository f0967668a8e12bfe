use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};
use learning_platform::config::Config;
use learning_platform::documents::{DocumentStore, MemoryDocumentStore, SledDocumentStore};
use learning_platform::logging::{init_tracing, LogConfig};
use learning_platform::routes::build_router;
use learning_platform::services::content::ContentGenerator;
use learning_platform::services::llm_provider::LlmProvider;
use learning_platform::services::mailer::LogMailer;
use learning_platform::state::AppState;
use learning_platform::store::Store;
use learning_platform::workers::course_generation::{run_consumer, CourseGenerationPipeline};
use learning_platform::workers::queue::GenerationQueue;
use learning_platform::workers::WorkerManager;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

const CSP_HEADER: &str = "default-src 'none'; frame-ancestors 'none'; base-uri 'none'";
const HSTS_HEADER: &str = "max-age=31536000; includeSubDomains";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    init_tracing(&LogConfig::from(&config));
    tracing::info!(config = ?config, "Starting learning-platform");

    LlmProvider::log_config(&config.llm);

    let store = match Store::open_with_cache_capacity(&config.sled_path, config.cache_capacity) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, path = %config.sled_path, "Failed to open sled database");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.run_migrations() {
        tracing::error!(error = %e, "Failed to run migrations");
        return ExitCode::FAILURE;
    }

    let sled_documents = if config.document_store_path.trim().is_empty() {
        tracing::warn!("DOCUMENT_STORE_PATH empty; course documents are kept in memory");
        None
    } else {
        match SledDocumentStore::open(&config.document_store_path) {
            Ok(docs) => Some(Arc::new(docs)),
            Err(e) => {
                tracing::error!(error = %e, path = %config.document_store_path, "Failed to open document store");
                return ExitCode::FAILURE;
            }
        }
    };
    let documents: Arc<dyn DocumentStore> = match &sled_documents {
        Some(docs) => docs.clone() as Arc<dyn DocumentStore>,
        None => Arc::new(MemoryDocumentStore::new()),
    };

    let cors_layer = match build_cors_layer(&config) {
        Ok(layer) => layer,
        Err(e) => {
            tracing::error!(error = %e, cors_origin = %config.cors_origin, "Invalid CORS_ORIGIN");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let (generation_queue, generation_rx) =
        GenerationQueue::new(config.generation.queue_capacity);

    let generator: Arc<dyn ContentGenerator> = Arc::new(LlmProvider::new(&config.llm));
    let pipeline = Arc::new(CourseGenerationPipeline::new(
        store.clone(),
        documents.clone(),
        generator,
        config.generation.courses_per_topic,
    ));
    let consumer_handle = tokio::spawn(run_consumer(
        pipeline,
        generation_rx,
        shutdown_tx.subscribe(),
    ));

    let state = AppState::new(
        store.clone(),
        documents,
        Arc::new(LogMailer),
        generation_queue,
        &config,
        shutdown_tx.clone(),
    );

    if config.worker.is_leader {
        let worker_manager =
            WorkerManager::new(store.clone(), shutdown_tx.subscribe(), &config.worker);
        let handle = tokio::spawn(async move {
            if let Err(e) = worker_manager.start().await {
                tracing::error!(error = %e, "Worker manager failed");
            }
        });
        // A worker panic is logged; the HTTP server keeps running.
        tokio::spawn(async move {
            match handle.await {
                Err(e) => tracing::error!(error = %e, "Worker task panicked, HTTP server continues"),
                Ok(()) => tracing::info!("Worker manager exited normally"),
            }
        });
    }

    let app = build_router(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("content-security-policy"),
            HeaderValue::from_static(CSP_HEADER),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_static(HSTS_HEADER),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind TCP listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "Listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
    .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    // Covers the crash path, where no signal was broadcast.
    let _ = shutdown_tx.send(());
    if let Err(e) = consumer_handle.await {
        tracing::error!(error = %e, "Generation consumer panicked");
    }

    tracing::info!("Flushing stores before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    if let Some(docs) = sled_documents {
        if let Err(e) = docs.flush() {
            tracing::error!(error = %e, "Failed to flush document store before exit");
        }
    }
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

fn build_cors_layer(config: &Config) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let allowed_headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    if config.cors_origin.trim() == "*" {
        // Wildcard origins cannot carry credentials.
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers(allowed_headers)
            .allow_methods(Any));
    }

    let origin = config.cors_origin.trim().parse::<HeaderValue>()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_headers(allowed_headers)
        .allow_methods(Any))
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
