use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::db::{Database, Video};

#[derive(Serialize)]
pub struct VideoSummary {
    id: i64,
    title: String,
    description: Option<String>,
    file: String,
    uploaded_at: String,
    duration_seconds: i64,
}

impl From<Video> for VideoSummary {
    fn from(video: Video) -> Self {
        VideoSummary {
            id: video.id,
            title: video.title,
            description: video.description,
            file: video.file,
            uploaded_at: video.uploaded_at.to_rfc3339(),
            duration_seconds: video.duration_seconds,
        }
    }
}

pub fn router(db: Arc<Database>) -> Router {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/:name/videos", get(tag_videos))
        .with_state(db)
}

fn internal(e: anyhow::Error) -> StatusCode {
    error!("Catalog query failed: {:?}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn list_tags(State(db): State<Arc<Database>>) -> Result<Json<Vec<String>>, StatusCode> {
    let tags = db.list_tags().map_err(internal)?;
    Ok(Json(tags.into_iter().map(|t| t.name).collect()))
}

async fn tag_videos(
    State(db): State<Arc<Database>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<VideoSummary>>, StatusCode> {
    let tag = db
        .get_tag(name.trim())
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let videos = db.videos_for_tag(tag.id).map_err(internal)?;
    Ok(Json(videos.into_iter().map(VideoSummary::from).collect()))
}
