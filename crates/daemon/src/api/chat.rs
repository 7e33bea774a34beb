use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use engine::{no_matches_text, Transcript, NOT_UNDERSTOOD_TEXT};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::api::AppState;
use crate::assembly;
use crate::dialogue::Exchange;
use crate::error::ApiError;
use crate::session::{SessionStore, SESSION_COOKIE};

const INDEX_PAGE: &str = include_str!("../../static/index.html");
const CHAT_PAGE: &str = include_str!("../../static/chat.html");

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    /// Return a job id right away instead of waiting for the video.
    #[serde(default, rename = "async")]
    run_async: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat/", get(chat_page))
        .route(
            "/chat/process/",
            post(process_message).fallback(method_not_allowed),
        )
        .with_state(state)
}

/// The caller's session id, minting one (and its cookie) when needed.
fn ensure_session(sessions: &SessionStore, jar: CookieJar) -> (CookieJar, String) {
    let (session_id, is_new) = sessions.resolve(jar.get(SESSION_COOKIE).map(|c| c.value()));
    if !is_new {
        return (jar, session_id);
    }
    let cookie = Cookie::build((SESSION_COOKIE, session_id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), session_id)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn chat_page(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Html<&'static str>) {
    let (jar, session_id) = ensure_session(&state.sessions, jar);
    state.sessions.reset(&session_id).await;
    (jar, Html(CHAT_PAGE))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn process_message(State(state): State<AppState>, jar: CookieJar, body: Bytes) -> (CookieJar, Response) {
    let (jar, session_id) = ensure_session(&state.sessions, jar);
    let conversation = state.sessions.conversation(&session_id);
    // Held through an awaited assembly, so a reset of this session waits for it.
    let mut transcript = conversation.lock().await;

    let response = match handle_message(&state, &mut transcript, &body).await {
        Ok(response) => response,
        Err(e) => {
            error!(session = %session_id, "Chat request failed: {}", e);
            transcript.clear();
            e.into_response()
        }
    };
    (jar, response)
}

async fn handle_message(state: &AppState, transcript: &mut Transcript, body: &[u8]) -> Result<Response, ApiError> {
    let request: ChatRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;

    let (tags, response_text) = match state.dialogue.respond(transcript, &request.message).await? {
        Exchange::Question(question) => {
            return Ok(Json(json!({ "response": question })).into_response());
        }
        Exchange::NotUnderstood => {
            return Ok(Json(json!({ "response": NOT_UNDERSTOOD_TEXT })).into_response());
        }
        Exchange::Ready { tags, response_text } => (tags, response_text),
    };

    let Some(selection) = assembly::select(&state.db, &tags)? else {
        info!(tags = ?tags, "No catalog video matches");
        return Ok(Json(json!({ "response": no_matches_text(&tags) })).into_response());
    };
    info!(
        video_id = selection.video.id,
        audio_id = ?selection.audio.as_ref().map(|a| a.id),
        "Selected media for assembly"
    );

    if request.run_async {
        let job_id = state.queue.submit(selection).await?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "response": response_text, "job_id": job_id })),
        )
            .into_response());
    }

    let (job_id, assembled) = state.queue.submit_and_wait(selection).await?;
    info!(job_id, "Returning assembled video");
    Ok(Json(json!({
        "response": response_text,
        "video_url": assembled.video_url,
    }))
    .into_response())
}
