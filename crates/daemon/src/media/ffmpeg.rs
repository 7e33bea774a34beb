use anyhow::{Context, Result};
use async_trait::async_trait;
use engine::render::generate_mux_command;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::MediaToolsConfig;
use crate::error::AssemblyError;
use crate::media::Muxer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

impl ProbeOutput {
    fn into_media_info(self) -> MediaInfo {
        let duration_seconds = self
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        MediaInfo { duration_seconds }
    }
}

pub struct FFmpegWrapper {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FFmpegWrapper {
    pub fn new(tools: &MediaToolsConfig) -> Self {
        FFmpegWrapper {
            ffmpeg: tools.ffmpeg_path.clone(),
            ffprobe: tools.ffprobe_path.clone(),
        }
    }

    pub async fn probe(&self, media_path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(media_path)
            .output()
            .await
            .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed: {}", stderr.trim());
        }

        let probe_output: ProbeOutput = serde_json::from_slice(&output.stdout)
            .context("Failed to parse ffprobe JSON output")?;

        Ok(probe_output.into_media_info())
    }
}

#[async_trait]
impl Muxer for FFmpegWrapper {
    async fn mux(&self, video: &Path, audio: Option<&Path>, output: &Path) -> Result<(), AssemblyError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = generate_mux_command(video, audio, output.to_path_buf());
        debug!("Running {} {}", self.ffmpeg.display(), cmd.ffmpeg_args.join(" "));

        let result = Command::new(&self.ffmpeg)
            .args(&cmd.ffmpeg_args)
            .output()
            .await
            .map_err(|e| AssemblyError::Mux(format!("failed to execute {}: {}", self.ffmpeg.display(), e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AssemblyError::Mux(format!(
                "exit status {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
