use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use daemon::config::{MediaToolsConfig, StorageConfig};
use daemon::db::Database;
use daemon::importer::BulkImporter;
use daemon::media::ffmpeg::FFmpegWrapper;
use daemon::storage::{GcsStore, ObjectStore};
use engine::media::MediaKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONNECTIVITY_OBJECT: &str = "connectivity-check/hello.txt";

#[derive(Parser)]
#[command(name = "catalog-import", about = "Upload media folders into the catalog")]
struct Cli {
    #[arg(long = "db", env = "DATABASE_PATH", default_value = ".cache/catalog.db")]
    db_path: PathBuf,

    #[arg(long = "http-timeout-secs", env = "HTTP_TIMEOUT_SECS", default_value_t = 120)]
    http_timeout_secs: u64,

    #[command(flatten)]
    storage: StorageConfig,

    #[command(flatten)]
    tools: MediaToolsConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import video files (mp4, mov, avi, mkv)
    Videos { folder_path: PathBuf, tag_name: String },
    /// Import audio files (mp3, wav, ogg, m4a)
    Audios { folder_path: PathBuf, tag_name: String },
    /// Import image files (png, jpg, jpeg, webp, gif)
    Images { folder_path: PathBuf, tag_name: String },
    /// Upload a small probe object to verify bucket credentials
    CheckStorage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = Arc::new(GcsStore::new(&cli.storage, Duration::from_secs(cli.http_timeout_secs))?);

    let (kind, folder, tag) = match cli.command {
        Command::Videos { folder_path, tag_name } => (MediaKind::Video, folder_path, tag_name),
        Command::Audios { folder_path, tag_name } => (MediaKind::Audio, folder_path, tag_name),
        Command::Images { folder_path, tag_name } => (MediaKind::Image, folder_path, tag_name),
        Command::CheckStorage => {
            store
                .upload_bytes(Bytes::from_static(b"Hello, World!"), CONNECTIVITY_OBJECT)
                .await
                .with_context(|| format!("Could not write to bucket '{}'", store.bucket()))?;
            info!("Uploaded {}", store.public_url(CONNECTIVITY_OBJECT));
            return Ok(());
        }
    };

    if let Some(parent) = cli.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(Database::new(&cli.db_path)?);
    let importer = BulkImporter::new(db, store, FFmpegWrapper::new(&cli.tools));

    let report = importer.import_folder(kind, &folder, &tag).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
