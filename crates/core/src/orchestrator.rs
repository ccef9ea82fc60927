//! Turn Orchestration
//!
//! Drives the two kinds of turns a tutoring session goes through: the primary
//! turn, where the learner says something and the tutor answers with speech,
//! and the feedback turn, where words the learner did not understand are
//! sent back for a simpler explanation.
//!
//! The primary turn is strict: any upstream failure aborts it and is reported
//! to the caller. The feedback turn is best-effort: failures collapse into
//! "no explanation", and a missing voice track still yields the text.

use crate::{
    alignment::align,
    comprehension::interpret,
    dialogue::{DialogueState, Turn},
    llm_client::{GenerationError, LLMClient},
    speech::{SpeechSynthesizer, Synthesis, SynthesisError},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Default bound on each generation and synthesis call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// A failed primary turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// The tutor's answer to a primary turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// The generated text in its annotated form.
    pub text: String,
    pub audio: Vec<u8>,
}

/// The tutor's re-explanation after comprehension feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    /// The explanation in its annotated form.
    pub text: String,
    /// `None` when synthesis failed; the text is still usable on its own.
    pub audio: Option<Vec<u8>>,
}

/// Builds the user turn asking the tutor to explain `words` again.
pub fn clarification_request(words: &[String]) -> String {
    format!(
        "The user did not fully understand the following terms: {}. Please explain these terms.",
        words.join(", ")
    )
}

/// Runs turns against a session's dialogue using the configured services.
///
/// The orchestrator holds no conversation state of its own. Callers must not
/// run two turns against the same `DialogueState` at once; taking it by
/// `&mut` enforces that for the duration of a turn.
pub struct TurnOrchestrator {
    llm_client: Arc<dyn LLMClient>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    timeout: Duration,
}

impl TurnOrchestrator {
    pub fn new(llm_client: Arc<dyn LLMClient>, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            llm_client,
            synthesizer,
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Overrides the bound on each upstream call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn generate(&self, dialogue: &DialogueState) -> Result<String, GenerationError> {
        tokio::time::timeout(self.timeout, self.llm_client.generate(dialogue.turns()))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }

    async fn synthesize(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        tokio::time::timeout(self.timeout, self.synthesizer.synthesize(text))
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeout))?
    }

    /// Handles one learner utterance.
    ///
    /// The user turn is appended before generation and the assistant turn
    /// before synthesis. Neither is rolled back if a later step fails.
    #[instrument(skip_all)]
    pub async fn submit_turn(
        &self,
        dialogue: &mut DialogueState,
        user_input: &str,
    ) -> Result<TurnReply, TurnError> {
        debug!(%user_input, "Received user input");
        dialogue.append(Turn::user(user_input));

        let response = self.generate(dialogue).await.inspect_err(|e| {
            error!(error = %e, "Error getting response from the language model");
        })?;
        debug!(%response, "Language model response");
        dialogue.append(Turn::assistant(response.as_str()));

        let synthesis = self.synthesize(&response).await.inspect_err(|e| {
            error!(error = %e, "Error converting text to speech");
        })?;
        debug!(
            timings = synthesis.timings.len(),
            audio_bytes = synthesis.audio.len(),
            "Text-to-speech conversion successful"
        );

        Ok(TurnReply {
            text: align(&response, &synthesis.timings),
            audio: synthesis.audio,
        })
    }

    /// Handles the learner's per-word comprehension scores for `annotated`.
    ///
    /// Returns `None` whenever there is nothing to explain: malformed scores,
    /// a score count that does not match the word count, no low scores, or a
    /// failed generation. Only the last of these leaves a trace in the
    /// dialogue, in the form of an unanswered clarification request.
    #[instrument(skip_all)]
    pub async fn submit_feedback(
        &self,
        dialogue: &mut DialogueState,
        scores: &[Value],
        annotated: &str,
    ) -> Option<Explanation> {
        debug!(?scores, %annotated, "Received comprehension feedback");

        let words = match interpret(scores, annotated) {
            Ok(words) => words,
            Err(e) => {
                warn!(error = %e, "Discarding comprehension feedback");
                return None;
            }
        };

        if words.is_empty() {
            debug!("No problematic words identified.");
            return None;
        }

        let request = clarification_request(&words);
        info!(terms = words.len(), "Requesting clarification");
        debug!(%request, "Sending feedback to the language model");
        dialogue.append(Turn::user(request));

        let explanation = match self.generate(dialogue).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Error getting explanation from the language model");
                return None;
            }
        };
        debug!(%explanation, "Language model explanation");
        dialogue.append(Turn::assistant(explanation.as_str()));

        let (timings, audio) = match self.synthesize(&explanation).await {
            Ok(synthesis) => (synthesis.timings, Some(synthesis.audio)),
            Err(e) => {
                error!(error = %e, "Error converting explanation to speech");
                (Vec::new(), None)
            }
        };

        Some(Explanation {
            text: align(&explanation, &timings),
            audio,
        })
    }
}
