//! Bulk import of a local folder into object storage and the catalog.

use anyhow::{anyhow, Context, Result};
use engine::media::{object_name_for, title_from_file_name, MediaKind};
use engine::tags::normalize_tag;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Database, Tag};
use crate::media::compute_file_checksum;
use crate::media::ffmpeg::FFmpegWrapper;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub scanned: usize,
    pub uploaded: usize,
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
}

pub struct BulkImporter {
    db: Arc<Database>,
    store: Arc<dyn ObjectStore>,
    ffmpeg: FFmpegWrapper,
}

/// Direct children of `folder` with an extension of `kind`, in file name order.
async fn list_media_files(kind: MediaKind, folder: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .with_context(|| format!("Cannot read folder {}", folder.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && kind.matches_file(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

impl BulkImporter {
    pub fn new(db: Arc<Database>, store: Arc<dyn ObjectStore>, ffmpeg: FFmpegWrapper) -> Self {
        BulkImporter { db, store, ffmpeg }
    }

    /// Upload every `kind` file in `folder` and tag its catalog entry with `tag_name`.
    ///
    /// An unreachable bucket aborts the run before anything is touched.
    /// Failures on individual files are logged, counted and skipped.
    pub async fn import_folder(&self, kind: MediaKind, folder: &Path, tag_name: &str) -> Result<ImportReport> {
        let tag_name = normalize_tag(tag_name).ok_or_else(|| anyhow!("Tag name must not be blank"))?;

        self.store
            .check_bucket()
            .await
            .with_context(|| format!("Bucket '{}' is not reachable", self.store.bucket()))?;
        info!("Connected to bucket '{}'", self.store.bucket());

        let (tag, created) = self.db.get_or_create_tag(&tag_name)?;
        if created {
            info!("Created tag '{}'", tag.name);
        } else {
            info!("Using existing tag '{}'", tag.name);
        }

        let files = list_media_files(kind, folder).await?;
        let mut report = ImportReport::default();

        for path in files {
            report.scanned += 1;
            if let Err(e) = self.import_file(kind, &path, &tag, &mut report).await {
                report.failed += 1;
                warn!("Skipping {}: {:#}", path.display(), e);
            }
        }

        info!(
            kind = kind.as_str(),
            scanned = report.scanned,
            uploaded = report.uploaded,
            created = report.created,
            existing = report.existing,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }

    async fn import_file(&self, kind: MediaKind, path: &Path, tag: &Tag, report: &mut ImportReport) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("File name is not valid UTF-8"))?;

        let object_name = object_name_for(kind, file_name);
        self.store
            .upload_file(path, &object_name)
            .await
            .with_context(|| format!("Upload to {} failed", object_name))?;
        report.uploaded += 1;
        info!("Uploaded {} to {}", file_name, object_name);

        let title = title_from_file_name(file_name);
        let (media_id, created) = self.db.get_or_create_media(kind, &title, &object_name)?;
        if created {
            report.created += 1;
            info!("Created {} '{}'", kind.as_str(), title);
        } else {
            report.existing += 1;
            info!("{} '{}' already in the catalog", kind.as_str(), title);
        }

        let checksum = compute_file_checksum(path).await?;
        let duration = if kind.is_timed() {
            match self.ffmpeg.probe(path).await {
                Ok(info) => Some(info.duration_seconds.round() as i64),
                Err(e) => {
                    warn!("Could not probe duration of {}: {:#}", file_name, e);
                    Some(0)
                }
            }
        } else {
            None
        };
        self.db
            .update_media_details(kind, media_id, Some(&checksum), duration)?;
        self.db.add_tag(kind, media_id, tag.id)?;
        Ok(())
    }
}
