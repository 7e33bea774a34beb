use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
        }
    }

    /// Lowercase file extensions accepted by the bulk importer.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Video => &["mp4", "mov", "avi", "mkv"],
            MediaKind::Audio => &["mp3", "wav", "ogg", "m4a"],
            MediaKind::Image => &["png", "jpg", "jpeg", "webp", "gif"],
        }
    }

    /// Object-storage prefix imported files of this kind are stored under.
    pub fn storage_prefix(&self) -> &'static str {
        match self {
            MediaKind::Video => "videos/",
            MediaKind::Audio => "audios/",
            MediaKind::Image => "images/",
        }
    }

    /// Whether the file has a duration worth probing.
    pub fn is_timed(&self) -> bool {
        !matches!(self, MediaKind::Image)
    }

    pub fn matches_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions().contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Catalog title for an imported file: its name without the extension.
pub fn title_from_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

/// Object name an imported file is uploaded to.
pub fn object_name_for(kind: MediaKind, file_name: &str) -> String {
    format!("{}{}", kind.storage_prefix(), file_name)
}
