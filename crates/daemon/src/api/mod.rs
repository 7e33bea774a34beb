use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::dialogue::DialogueEngine;
use crate::jobs::processor::AssemblyQueue;
use crate::jobs::JobManager;
use crate::session::SessionStore;

pub mod catalog;
pub mod chat;
pub mod jobs;

/// Everything the request handlers share.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub job_manager: Arc<JobManager>,
    pub sessions: Arc<SessionStore>,
    pub dialogue: Arc<DialogueEngine>,
    pub queue: AssemblyQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(chat::router(state.clone()))
        .nest("/api", {
            Router::new()
                .merge(catalog::router(state.db.clone()))
                .nest("/jobs", jobs::router(state.job_manager))
        })
}
