use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

use learning_platform::config::{Config, GenerationConfig, LLMConfig, MailConfig, WorkerConfig};
use learning_platform::documents::MemoryDocumentStore;
use learning_platform::routes::build_router;
use learning_platform::services::mailer::MemoryMailer;
use learning_platform::state::AppState;
use learning_platform::store::Store;
use learning_platform::workers::queue::{GenerationJob, GenerationQueue};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub store: Arc<Store>,
    pub documents: Arc<MemoryDocumentStore>,
    pub mailer: Arc<MemoryMailer>,
    /// Jobs the topic endpoint enqueued; nothing consumes them in tests.
    pub jobs: mpsc::Receiver<GenerationJob>,
    _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &TempDir, queue_capacity: usize) -> Config {
    // Built by hand so parallel tests never race on env vars.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 0,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: temp_dir
            .path()
            .join("platform-test.sled")
            .to_string_lossy()
            .to_string(),
        document_store_path: String::new(),
        cache_capacity: 64,
        jwt_secret: format!("integration-test-jwt-secret-{}", uuid::Uuid::new_v4()),
        jwt_expires_in_hours: 24,
        cors_origin: "http://localhost:5173".to_string(),
        worker: WorkerConfig { is_leader: false },
        llm: LLMConfig {
            enabled: true,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test-model".to_string(),
            temperature: 0.0,
            timeout_secs: 5,
        },
        generation: GenerationConfig {
            queue_capacity,
            courses_per_topic: 3,
        },
        mail: MailConfig {
            from_address: "no-reply@test.local".to_string(),
            reset_code_ttl_minutes: 10,
        },
    }
}

pub async fn spawn_with_queue(queue_capacity: usize) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir, queue_capacity);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let documents = Arc::new(MemoryDocumentStore::new());
    let mailer = Arc::new(MemoryMailer::new());
    let (queue, jobs) = GenerationQueue::new(queue_capacity);
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(
        store.clone(),
        documents.clone(),
        mailer.clone(),
        queue,
        &config,
        shutdown_tx,
    );
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        store,
        documents,
        mailer,
        jobs,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with_queue(16).await
}
