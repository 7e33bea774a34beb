use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORAGE_BASE: &str = "https://storage.googleapis.com";
pub const DEFAULT_GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Args)]
pub struct StorageConfig {
    /// Bucket holding catalog media and assembled videos
    #[arg(long = "bucket", env = "GCS_BUCKET")]
    pub bucket: String,

    /// OAuth bearer token for the storage JSON API
    #[arg(long = "storage-token", env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(id = "storage_api_base", long = "storage-api-base", env = "GCS_API_BASE", default_value = DEFAULT_STORAGE_BASE)]
    pub api_base: String,

    /// Base of the public object URLs handed back to clients
    #[arg(long = "storage-public-base", env = "GCS_PUBLIC_BASE", default_value = DEFAULT_STORAGE_BASE)]
    pub public_base: String,
}

#[derive(Debug, Clone, Args)]
pub struct GeminiConfig {
    #[arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(id = "gemini_api_base", long = "gemini-api-base", env = "GEMINI_API_BASE", default_value = DEFAULT_GEMINI_BASE)]
    pub api_base: String,

    #[arg(long = "gemini-model", env = "GEMINI_MODEL", default_value = "gemini-pro")]
    pub model: String,
}

#[derive(Debug, Clone, Args)]
pub struct MediaToolsConfig {
    #[arg(long = "ffmpeg", env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: PathBuf,

    #[arg(long = "ffprobe", env = "FFPROBE_PATH", default_value = "ffprobe")]
    pub ffprobe_path: PathBuf,
}

impl Default for MediaToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "daemon", about = "Chat-driven video assembly server")]
pub struct ServerConfig {
    #[arg(long = "bind", env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
    pub bind_addr: SocketAddr,

    #[arg(long = "db", env = "DATABASE_PATH", default_value = ".cache/catalog.db")]
    pub db_path: PathBuf,

    /// Root for per-job scratch directories (defaults to the system temp dir)
    #[arg(long = "scratch-dir", env = "SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long = "max-concurrent-jobs", env = "MAX_CONCURRENT_JOBS", default_value_t = 2)]
    pub max_concurrent_jobs: usize,

    #[arg(long = "http-timeout-secs", env = "HTTP_TIMEOUT_SECS", default_value_t = 120)]
    pub http_timeout_secs: u64,

    #[command(flatten)]
    pub gemini: GeminiConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub tools: MediaToolsConfig,
}

impl ServerConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
