use anyhow::Result;
use chrono::Utc;
use engine::render::{generated_object_name, output_file_name};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Audio, Database, Video};
use crate::error::AssemblyError;
use crate::media::{compute_file_checksum, Muxer};
use crate::storage::ObjectStore;

/// The catalog entries one assembly combines.
#[derive(Debug, Clone)]
pub struct Selection {
    pub tags: Vec<String>,
    pub video: Video,
    pub audio: Option<Audio>,
}

impl Selection {
    pub fn payload(&self) -> Value {
        json!({
            "tags": self.tags,
            "video_id": self.video.id,
            "audio_id": self.audio.as_ref().map(|a| a.id),
        })
    }
}

/// Pick the first video and audio carrying any of `tags`.
///
/// `None` when no video matches; a missing audio still yields a selection.
pub fn select(db: &Database, tags: &[String]) -> Result<Option<Selection>> {
    let Some(video) = db.first_video_with_any_tag(tags)? else {
        return Ok(None);
    };
    let audio = db.first_audio_with_any_tag(tags)?;
    Ok(Some(Selection {
        tags: tags.to_vec(),
        video,
        audio,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub object_name: String,
    pub video_url: String,
    pub checksum: String,
}

impl AssembledVideo {
    pub fn to_json(&self) -> Value {
        json!({
            "video_url": self.video_url,
            "object_name": self.object_name,
            "checksum": self.checksum,
        })
    }
}

pub struct AssemblyPipeline {
    store: Arc<dyn ObjectStore>,
    muxer: Arc<dyn Muxer>,
    scratch_root: PathBuf,
}

fn extension_of(file: &str, fallback: &str) -> String {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| fallback.to_string())
}

impl AssemblyPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, muxer: Arc<dyn Muxer>, scratch_root: PathBuf) -> Self {
        AssemblyPipeline {
            store,
            muxer,
            scratch_root,
        }
    }

    /// Download, mux and publish one selection.
    ///
    /// Every intermediate file lives in a scratch directory owned by this
    /// call; it is removed however the call ends.
    pub async fn assemble(&self, selection: &Selection) -> Result<AssembledVideo, AssemblyError> {
        tokio::fs::create_dir_all(&self.scratch_root).await?;
        let scratch = tempfile::Builder::new()
            .prefix("assembly-")
            .tempdir_in(&self.scratch_root)?;

        let video = &selection.video;
        let video_path = scratch
            .path()
            .join(format!("source_video.{}", extension_of(&video.file, "mp4")));
        let bytes = self.store.download_to(&video.file, &video_path).await?;
        info!(video_id = video.id, bytes, "Downloaded source video");

        let audio_path = match &selection.audio {
            Some(audio) => {
                let path = scratch
                    .path()
                    .join(format!("source_audio.{}", extension_of(&audio.file, "mp3")));
                let bytes = self.store.download_to(&audio.file, &path).await?;
                info!(audio_id = audio.id, bytes, "Downloaded source audio");
                Some(path)
            }
            None => {
                info!(video_id = video.id, "No matching audio, composing without a soundtrack");
                None
            }
        };

        let suffix = Uuid::new_v4().simple().to_string();
        let file_name = output_file_name(video.id, Utc::now().timestamp(), &suffix[..8]);
        let output = scratch.path().join(&file_name);
        self.muxer.mux(&video_path, audio_path.as_deref(), &output).await?;

        let checksum = compute_file_checksum(&output).await?;
        let object_name = generated_object_name(&file_name);
        self.store.upload_file(&output, &object_name).await?;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory {}: {}", scratch_path.display(), e);
        }

        Ok(AssembledVideo {
            video_url: self.store.public_url(&object_name),
            object_name,
            checksum,
        })
    }
}
