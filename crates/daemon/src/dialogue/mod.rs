use engine::{build_prompt, parse_reply, DialogueReply, Transcript};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ChatError;
use crate::llm::ChatModel;

/// Outcome of one user message.
#[derive(Debug, Clone, PartialEq)]
pub enum Exchange {
    /// The assistant needs more detail; the question is already in the transcript.
    Question(String),
    /// The brief is complete and the transcript has been cleared.
    Ready { tags: Vec<String>, response_text: String },
    /// The reply had an unknown shape; the user's message was not kept.
    NotUnderstood,
}

pub struct DialogueEngine {
    model: Arc<dyn ChatModel>,
}

impl DialogueEngine {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        DialogueEngine { model }
    }

    /// Run one exchange against `transcript`.
    ///
    /// On any error the transcript is cleared so the next message starts a
    /// fresh conversation.
    pub async fn respond(&self, transcript: &mut Transcript, message: &str) -> Result<Exchange, ChatError> {
        transcript.push_user(message);
        let prompt = build_prompt(transcript);

        let reply = match self.model.generate(&prompt).await {
            Ok(raw) => parse_reply(&raw).map_err(ChatError::from),
            Err(e) => Err(e),
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Dialogue exchange failed, resetting conversation: {}", e);
                transcript.clear();
                return Err(e);
            }
        };

        match reply {
            DialogueReply::Clarifying { question, tags } => {
                info!(collected = ?tags, "Assistant asked a clarifying question");
                transcript.push_assistant(question.clone());
                Ok(Exchange::Question(question))
            }
            DialogueReply::Ready { tags, response_text } => {
                info!(tags = ?tags, "Brief complete");
                transcript.clear();
                Ok(Exchange::Ready { tags, response_text })
            }
            DialogueReply::Unrecognized { status } => {
                warn!(status = ?status, "Chatbot replied with an unknown status");
                transcript.pop();
                Ok(Exchange::NotUnderstood)
            }
        }
    }
}
