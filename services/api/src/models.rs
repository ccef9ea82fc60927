//! API Models
//!
//! This module defines the JSON payloads of the HTTP API and generates their
//! OpenAPI schemas with `utoipa`. Field names of the turn and feedback
//! payloads are part of the wire contract with existing browser clients.

use base64::Engine;
use chrono::{DateTime, Utc};
use clarify_core::{
    dialogue::Turn,
    orchestrator::{Explanation, TurnReply},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Encodes synthesized audio for transport in a JSON body.
pub fn encode_audio(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitTurnPayload {
    #[schema(example = "Wie sagt man 'library' auf Deutsch?")]
    pub user_input: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TurnResponse {
    /// The generated response with inline `[<offset>ms]` word timestamps.
    #[schema(example = "Man[0ms] sagt[180ms] Bibliothek.[420ms]")]
    pub chatgpt_response: String,
    /// Base64-encoded audio of the response.
    pub audio_data: Option<String>,
}

impl From<TurnReply> for TurnResponse {
    fn from(reply: TurnReply) -> Self {
        Self {
            chatgpt_response: reply.text,
            audio_data: Some(encode_audio(&reply.audio)),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ComprehensionFeedbackPayload {
    /// One score per word of `assistant_response`, as numbers or numeric strings.
    #[serde(default)]
    #[schema(value_type = Vec<Object>, example = json!([10, "4", 10]))]
    pub word_comprehension: Vec<serde_json::Value>,
    /// The annotated response exactly as the client received it.
    #[serde(default)]
    #[schema(example = "Man[0ms] sagt[180ms] Bibliothek.[420ms]")]
    pub assistant_response: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct FeedbackResponse {
    #[schema(example = "success")]
    pub status: String,
    /// The annotated explanation, or null when there is nothing to explain.
    pub explanation: Option<String>,
    pub audio_data: Option<String>,
}

impl From<Option<Explanation>> for FeedbackResponse {
    fn from(explanation: Option<Explanation>) -> Self {
        let (explanation, audio_data) = match explanation {
            Some(e) => (Some(e.text), e.audio.as_deref().map(encode_audio)),
            None => (None, None),
        };
        Self {
            status: "success".to_string(),
            explanation,
            audio_data,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionCreated {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TurnView {
    #[schema(example = "assistant")]
    pub role: String,
    pub content: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role().to_string(),
            content: turn.content().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionHistory {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<TurnView>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}
