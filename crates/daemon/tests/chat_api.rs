//! HTTP tests for the chat endpoint, driven through the router with a
//! scripted chatbot, an in-memory object store and a muxer that copies bytes.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use daemon::assembly::AssemblyPipeline;
use daemon::db::{Database, NewMedia};
use daemon::dialogue::DialogueEngine;
use daemon::error::{AssemblyError, ChatError, StorageError};
use daemon::jobs::processor::JobProcessor;
use daemon::jobs::JobManager;
use daemon::llm::ChatModel;
use daemon::media::Muxer;
use daemon::session::SessionStore;
use daemon::storage::ObjectStore;
use daemon::AppState;
use engine::media::MediaKind;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt; // for `oneshot`

const PUBLIC_PREFIX: &str = "https://storage.googleapis.com/test-bucket/";

struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ChatError>>>,
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ChatError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ChatError::EmptyReply))
    }
}

#[derive(Default)]
struct MemoryStore {
    uploads: Mutex<Vec<String>>,
    downloads: AtomicUsize,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    fn public_url(&self, object_name: &str) -> String {
        format!("{}{}", PUBLIC_PREFIX, object_name)
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn upload_file(&self, _local_path: &Path, object_name: &str) -> Result<(), StorageError> {
        self.uploads.lock().unwrap().push(object_name.to_string());
        Ok(())
    }

    async fn upload_bytes(&self, _data: Bytes, object_name: &str) -> Result<(), StorageError> {
        self.uploads.lock().unwrap().push(object_name.to_string());
        Ok(())
    }

    async fn download_to(&self, object_name: &str, dest: &Path) -> Result<u64, StorageError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, object_name).await?;
        Ok(object_name.len() as u64)
    }
}

#[derive(Default)]
struct CopyMuxer {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Muxer for CopyMuxer {
    async fn mux(&self, video: &Path, _audio: Option<&Path>, output: &Path) -> Result<(), AssemblyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AssemblyError::Mux("exit status 1: invalid data".to_string()));
        }
        tokio::fs::copy(video, output).await?;
        Ok(())
    }
}

struct Harness {
    app: Router,
    db: Arc<Database>,
    sessions: Arc<SessionStore>,
    store: Arc<MemoryStore>,
    muxer: Arc<CopyMuxer>,
    scratch: tempfile::TempDir,
}

/// Test helper: app over an in-memory catalog with one "space" video and one "epic" audio.
fn harness(replies: Vec<Result<&str, ChatError>>) -> Harness {
    harness_with_muxer(replies, CopyMuxer::default())
}

fn harness_with_muxer(replies: Vec<Result<&str, ChatError>>, muxer: CopyMuxer) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    db.create_tagged_media(
        MediaKind::Video,
        &NewMedia {
            title: "Rocket launch".to_string(),
            file: "videos/rocket launch.mp4".to_string(),
            ..Default::default()
        },
        &["space"],
    )
    .unwrap();
    db.create_tagged_media(
        MediaKind::Audio,
        &NewMedia {
            title: "Anthem".to_string(),
            file: "audios/anthem.mp3".to_string(),
            ..Default::default()
        },
        &["epic"],
    )
    .unwrap();

    let model = Arc::new(ScriptedModel {
        replies: Mutex::new(
            replies
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
        ),
    });
    let store = Arc::new(MemoryStore::default());
    let muxer = Arc::new(muxer);
    let scratch = tempfile::tempdir().unwrap();

    let pipeline = Arc::new(AssemblyPipeline::new(
        store.clone(),
        muxer.clone(),
        scratch.path().to_path_buf(),
    ));
    let job_manager = Arc::new(JobManager::new(db.clone()));
    let (processor, queue) = JobProcessor::new(pipeline, job_manager.clone(), 1);
    tokio::spawn(processor.run());

    let sessions = Arc::new(SessionStore::new());
    let state = AppState {
        db: db.clone(),
        job_manager,
        sessions: sessions.clone(),
        dialogue: Arc::new(DialogueEngine::new(model)),
        queue,
    };

    Harness {
        app: daemon::app(state),
        db,
        sessions,
        store,
        muxer,
        scratch,
    }
}

fn chat_request(cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/chat/process/")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// `session_id=...` pair from a Set-Cookie header.
fn session_cookie(response: &axum::response::Response) -> Option<String> {
    let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    value.split(';').next().map(|pair| pair.trim().to_string())
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn transcript_len(h: &Harness, cookie: &str) -> usize {
    let session_id = cookie.trim_start_matches("session_id=");
    h.sessions.conversation(session_id).lock().await.len()
}

const CLARIFYING: &str =
    r#"Sure! {"status": "clarifying", "question": "What mood should it have?", "tags": ["space"]}"#;
const READY: &str =
    r#"{"status": "ready", "tags": ["space", "epic"], "response_text": "Here is your epic space video!"}"#;

#[tokio::test]
async fn clarifying_reply_has_no_video() {
    let h = harness(vec![Ok(CLARIFYING)]);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "A video about space"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).expect("session cookie");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/"));

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["response"], "What mood should it have?");
    assert!(body.get("video_url").is_none());
    assert_eq!(transcript_len(&h, &cookie).await, 2);
}

#[tokio::test]
async fn ready_reply_returns_public_video_url() {
    let h = harness(vec![Ok(CLARIFYING), Ok(READY)]);

    let first = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "A video about space"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();

    let response = h
        .app
        .clone()
        .oneshot(chat_request(Some(&cookie), r#"{"message": "Epic"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["response"], "Here is your epic space video!");
    let url = body["video_url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{}generated/video_final_", PUBLIC_PREFIX)));
    assert!(url.ends_with(".mp4"));

    assert_eq!(h.muxer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.downloads.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.uploads.lock().unwrap().len(), 1);
    assert_eq!(transcript_len(&h, &cookie).await, 0);
}

#[tokio::test]
async fn failed_assembly_is_a_500_and_leaves_nothing_behind() {
    let h = harness_with_muxer(
        vec![Ok(CLARIFYING), Ok(READY)],
        CopyMuxer {
            fail: true,
            ..Default::default()
        },
    );

    let first = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "A video about space"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();
    assert_eq!(transcript_len(&h, &cookie).await, 2);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(Some(&cookie), r#"{"message": "Epic"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("A general error occurred"));
    assert!(error.contains("invalid data"));
    assert!(body.get("video_url").is_none());

    assert_eq!(h.muxer.calls.load(Ordering::SeqCst), 1);
    assert!(h.store.uploads.lock().unwrap().is_empty());
    assert_eq!(transcript_len(&h, &cookie).await, 0);
    assert!(std::fs::read_dir(h.scratch.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn unmatched_tags_get_a_soft_reply_without_assembly() {
    let h = harness(vec![Ok(
        r#"{"status": "ready", "tags": ["unicorn"], "response_text": "Coming right up"}"#,
    )]);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "unicorns please"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();

    let body = extract_json(response.into_body()).await;
    let text = body["response"].as_str().unwrap();
    assert!(text.contains("didn't find"));
    assert!(text.contains("unicorn"));
    assert!(body.get("video_url").is_none());

    assert_eq!(h.muxer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.downloads.load(Ordering::SeqCst), 0);
    assert!(h.store.uploads.lock().unwrap().is_empty());
    assert_eq!(transcript_len(&h, &cookie).await, 0);
}

#[tokio::test]
async fn unknown_status_is_not_an_error() {
    let h = harness(vec![Ok(r#"{"status": "thinking", "tags": null, "question": 42}"#)]);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "hmm"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["response"], engine::NOT_UNDERSTOOD_TEXT);
    assert_eq!(transcript_len(&h, &cookie).await, 0);
}

#[tokio::test]
async fn chatbot_failure_is_a_500_and_resets_the_conversation() {
    let h = harness(vec![
        Ok(CLARIFYING),
        Err(ChatError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }),
    ]);

    let first = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "space"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();
    assert_eq!(transcript_len(&h, &cookie).await, 2);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(Some(&cookie), r#"{"message": "epic"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("A general error occurred"));
    assert_eq!(transcript_len(&h, &cookie).await, 0);
}

#[tokio::test]
async fn unparsable_body_is_a_500_and_resets_the_conversation() {
    let h = harness(vec![Ok(CLARIFYING)]);

    let first = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "space"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();

    let response = h
        .app
        .clone()
        .oneshot(chat_request(Some(&cookie), "not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());
    assert_eq!(transcript_len(&h, &cookie).await, 0);
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let h = harness(vec![]);

    let response = h.app.clone().oneshot(get("/chat/process/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Invalid method");
}

#[tokio::test]
async fn async_mode_returns_a_pollable_job() {
    let h = harness(vec![Ok(READY)]);

    let response = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "epic space", "async": true}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["response"], "Here is your epic space video!");
    let job_id = body["job_id"].as_i64().unwrap();

    let mut job = Value::Null;
    for _ in 0..100 {
        let response = h
            .app
            .clone()
            .oneshot(get(&format!("/api/jobs/{}", job_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        job = extract_json(response.into_body()).await;
        if job["status"] == "Completed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(job["status"], "Completed");
    assert_eq!(job["job_type"], "AssembleVideo");
    assert!(job["result"]["video_url"]
        .as_str()
        .unwrap()
        .starts_with(PUBLIC_PREFIX));

    let missing = h.app.clone().oneshot(get("/api/jobs/9999")).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn opening_the_chat_page_starts_over() {
    let h = harness(vec![Ok(CLARIFYING)]);

    let first = h
        .app
        .clone()
        .oneshot(chat_request(None, r#"{"message": "space"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&first).unwrap();
    assert_eq!(transcript_len(&h, &cookie).await, 2);

    let page = Request::builder()
        .uri("/chat/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(page).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transcript_len(&h, &cookie).await, 0);

    let fresh = h.app.clone().oneshot(get("/chat/")).await.unwrap();
    assert!(session_cookie(&fresh).unwrap().starts_with("session_id="));
}

#[tokio::test]
async fn health_and_catalog_routes() {
    let h = harness(vec![]);

    let health = h.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body = extract_json(health.into_body()).await;
    assert_eq!(body["ok"], true);

    let tags = h.app.clone().oneshot(get("/api/tags")).await.unwrap();
    let body = extract_json(tags.into_body()).await;
    assert_eq!(body, serde_json::json!(["epic", "space"]));

    let videos = h
        .app
        .clone()
        .oneshot(get("/api/tags/Space/videos"))
        .await
        .unwrap();
    assert_eq!(videos.status(), StatusCode::OK);
    let body = extract_json(videos.into_body()).await;
    assert_eq!(body[0]["title"], "Rocket launch");

    let missing = h
        .app
        .clone()
        .oneshot(get("/api/tags/unicorn/videos"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    assert_eq!(h.db.list_tags().unwrap().len(), 2);
}
