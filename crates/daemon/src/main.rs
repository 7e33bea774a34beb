use clap::Parser;
use daemon::assembly::AssemblyPipeline;
use daemon::config::ServerConfig;
use daemon::db::Database;
use daemon::dialogue::DialogueEngine;
use daemon::jobs::processor::JobProcessor;
use daemon::jobs::JobManager;
use daemon::llm::GeminiClient;
use daemon::media::ffmpeg::FFmpegWrapper;
use daemon::session::SessionStore;
use daemon::storage::GcsStore;
use daemon::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(6 * 60 * 60);
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(&config.db_path)?);
    info!("Database initialized at {:?}", config.db_path);

    let job_manager = Arc::new(JobManager::new(db.clone()));

    let store = Arc::new(GcsStore::new(&config.storage, config.http_timeout())?);
    let model = GeminiClient::new(&config.gemini, config.http_timeout())?;
    if config.gemini.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; chat requests will fail");
    }

    let scratch_root = config.scratch_root();
    let pipeline = Arc::new(AssemblyPipeline::new(
        store,
        Arc::new(FFmpegWrapper::new(&config.tools)),
        scratch_root.clone(),
    ));
    info!("Assembly scratch root is {:?}", scratch_root);

    let (job_processor, queue) = JobProcessor::new(pipeline, job_manager.clone(), config.max_concurrent_jobs);
    let _processor_handle = tokio::spawn(job_processor.run());

    let sessions = Arc::new(SessionStore::new());
    let sweep_sessions = sessions.clone();
    let _sweeper_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let dropped = sweep_sessions.prune_idle(SESSION_IDLE_LIMIT);
            if dropped > 0 {
                info!("Dropped {} idle chat sessions", dropped);
            }
        }
    });

    let state = AppState {
        db,
        job_manager,
        sessions,
        dialogue: Arc::new(DialogueEngine::new(Arc::new(model))),
        queue,
    };

    info!("Starting server on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, daemon::app(state)).await?;

    Ok(())
}
