//! Prompt construction and reply parsing for the video-brief conversation.
//!
//! The chatbot is asked to answer with a single JSON object. Models tend to
//! wrap it in prose or code fences, so the object is located by the first
//! `{` and the last `}` of the reply text before it is decoded.

use serde_json::Value;
use thiserror::Error;

use crate::tags::normalize_tags;
use crate::transcript::{Transcript, ASSISTANT_NAME};

pub const DEFAULT_READY_TEXT: &str = "Your video is ready!";
pub const NOT_UNDERSTOOD_TEXT: &str =
    "I didn't quite understand that. Could you describe it another way?";

#[derive(Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("reply does not contain a JSON object")]
    NoJsonObject,
    #[error("reply JSON is malformed: {0}")]
    Malformed(String),
}

/// Decoded chatbot reply.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueReply {
    /// More detail is needed; `tags` holds what was collected so far.
    Clarifying { question: String, tags: Vec<String> },
    /// Enough detail was collected to assemble a video.
    Ready { tags: Vec<String>, response_text: String },
    /// Any status other than the two above, or a clarifying reply with no question.
    Unrecognized { status: Option<String> },
}

/// Build the full instruction prompt for the current transcript.
pub fn build_prompt(transcript: &Transcript) -> String {
    format!(
        r#"You are "{name}", a friendly and creative AI assistant for a video generation system. Your job is to talk with the user to find out what video they want.

Collect the following information as tags:
1. The main theme (e.g. sports, nature, technology).
2. The feeling or mood (e.g. motivational, suspense, funny, calm).
3. The music style (e.g. epic, calm, rock).

If you have enough tags (at least 2 or 3 descriptive ones), answer ONLY with JSON in this format:
{{"status": "ready", "tags": ["tag1", "tag2", "tag3"], "response_text": "Got it! I have everything I need. I'll start creating your video about [theme] with a [mood] feel and [style] music."}}

If you need more information, ask ONE clear and friendly question to get the next detail and answer ONLY with JSON in this format:
{{"status": "clarifying", "question": "Your question here.", "tags": ["tags_collected_so_far"]}}

Conversation so far:
{history}

Analyse the user's last message and produce your answer.
JSON:"#,
        name = ASSISTANT_NAME,
        history = transcript.render(),
    )
}

/// Slice out the outermost `{ ... }` span of `raw`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Non-blank string value of `key`; anything else reads as absent.
fn text_field(reply: &Value, key: &str) -> Option<String> {
    reply
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// String entries of the `tags` array. Other shapes yield no tags.
fn tag_field(reply: &Value) -> Vec<String> {
    let entries = reply.get("tags").and_then(Value::as_array);
    normalize_tags(entries.into_iter().flatten().filter_map(Value::as_str))
}

/// Decode a chatbot reply.
///
/// Only the status decides the branch. Fields are read for the branch that
/// uses them, so odd shapes elsewhere never turn a reply into an error.
pub fn parse_reply(raw: &str) -> Result<DialogueReply, ReplyError> {
    let json = extract_json_object(raw).ok_or(ReplyError::NoJsonObject)?;
    let reply: Value =
        serde_json::from_str(json).map_err(|e| ReplyError::Malformed(e.to_string()))?;

    let status = reply.get("status").and_then(Value::as_str).map(str::to_string);
    match status.as_deref() {
        Some("clarifying") => match text_field(&reply, "question") {
            Some(question) => Ok(DialogueReply::Clarifying {
                question,
                tags: tag_field(&reply),
            }),
            None => Ok(DialogueReply::Unrecognized { status }),
        },
        Some("ready") => Ok(DialogueReply::Ready {
            tags: tag_field(&reply),
            response_text: text_field(&reply, "response_text")
                .unwrap_or_else(|| DEFAULT_READY_TEXT.to_string()),
        }),
        _ => Ok(DialogueReply::Unrecognized { status }),
    }
}

/// Soft reply used when no catalog video carries any of `tags`.
pub fn no_matches_text(tags: &[String]) -> String {
    format!(
        "Sorry, I didn't find any videos tagged {}. Shall we try other tags?",
        serde_json::to_string(tags).unwrap_or_default()
    )
}
