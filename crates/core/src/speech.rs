//! Speech Synthesis
//!
//! Turns generated text into spoken audio together with the offset at which
//! each word is spoken. Two HTTP providers are supported: ElevenLabs, whose
//! timestamped endpoint returns a per-character alignment we fold into word
//! timings, and OpenAI, which returns audio only.

use crate::alignment::WordTiming;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failures of the speech-synthesis service.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("{0} API key required for TTS")]
    MissingApiKey(&'static str),
    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TTS provider error {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("TTS audio could not be decoded: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("TTS request timed out after {0:?}")]
    Timeout(Duration),
}

/// Audio for a piece of text, plus the timing of each word in it.
///
/// `timings` may be shorter than the text's word count, or empty when the
/// provider reports no timing marks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Synthesis {
    pub audio: Vec<u8>,
    pub timings: Vec<WordTiming>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text` to audio.
    async fn synthesize(&self, text: &str) -> Result<Synthesis, SynthesisError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech over a provider's HTTP API.
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Creates an ElevenLabs synthesizer. Responses include word timings.
    pub fn new_elevenlabs(
        api_key: String,
        voice_id: String,
        model: String,
    ) -> Result<Self, SynthesisError> {
        if api_key.is_empty() {
            return Err(SynthesisError::MissingApiKey("ElevenLabs"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            model,
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Creates an OpenAI synthesizer. Responses never include word timings.
    pub fn new_openai(api_key: String, voice: String, model: String) -> Result<Self, SynthesisError> {
        if api_key.is_empty() {
            return Err(SynthesisError::MissingApiKey("OpenAI"));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
            provider: TtsProvider::OpenAI,
        })
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}/with-timestamps?output_format=mp3_44100_128",
            self.voice
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Provider { status, body });
        }

        let body: TimestampedSpeech = response.json().await?;
        let audio = base64::engine::general_purpose::STANDARD.decode(&body.audio_base64)?;
        let timings = body
            .alignment
            .map(|a| word_timings_from_alignment(&a.characters, &a.character_start_times_seconds))
            .unwrap_or_default();

        Ok(Synthesis { audio, timings })
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(&self.api_key)
            .json(&TtsRequest {
                model: &self.model,
                input: text,
                voice: &self.voice,
                response_format: "mp3",
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Provider { status, body });
        }

        let audio = response.bytes().await?;
        Ok(Synthesis {
            audio: audio.to_vec(),
            timings: Vec::new(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Synthesis, SynthesisError> {
        debug!(provider = ?self.provider, chars = text.len(), "Synthesizing speech");
        match self.provider {
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
        }
    }
}

#[derive(Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    alignment: Option<CharacterAlignment>,
}

#[derive(Deserialize)]
struct CharacterAlignment {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
}

/// Folds a per-character alignment into word timings.
///
/// A word is a maximal run of non-whitespace characters; its offset is the
/// start time of its first character, rounded to the nearest millisecond.
pub fn word_timings_from_alignment(characters: &[String], starts: &[f64]) -> Vec<WordTiming> {
    let mut timings: Vec<WordTiming> = Vec::new();
    let mut in_word = false;

    for (ch, start) in characters.iter().zip(starts) {
        if ch.chars().all(char::is_whitespace) {
            in_word = false;
            continue;
        }
        match timings.last_mut() {
            Some(current) if in_word => current.word.push_str(ch),
            _ => {
                let offset_ms = (start * 1000.0).round().max(0.0) as u64;
                timings.push(WordTiming::new(ch.clone(), offset_ms));
                in_word = true;
            }
        }
    }

    timings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<String> {
        s.chars().map(String::from).collect()
    }

    #[test]
    fn test_word_timings_from_alignment() {
        let characters = chars("Hi there");
        let starts = vec![0.0, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35];

        let timings = word_timings_from_alignment(&characters, &starts);
        assert_eq!(
            timings,
            vec![WordTiming::new("Hi", 0), WordTiming::new("there", 150)]
        );
    }

    #[test]
    fn test_word_timings_skip_repeated_whitespace() {
        let characters = chars(" a  b\nc ");
        let starts: Vec<f64> = (0..characters.len()).map(|i| i as f64 * 0.1).collect();

        let timings = word_timings_from_alignment(&characters, &starts);
        assert_eq!(
            timings,
            vec![
                WordTiming::new("a", 100),
                WordTiming::new("b", 400),
                WordTiming::new("c", 600),
            ]
        );
    }

    #[test]
    fn test_word_timings_stop_at_shorter_sequence() {
        let characters = chars("ab cd");
        let starts = vec![0.0, 0.1];

        let timings = word_timings_from_alignment(&characters, &starts);
        assert_eq!(timings, vec![WordTiming::new("ab", 0)]);
    }

    #[test]
    fn test_word_timings_round_to_millisecond() {
        let timings = word_timings_from_alignment(&chars("x"), &[1.2346]);
        assert_eq!(timings[0].offset_ms, 1235);
    }

    #[test]
    fn test_constructors_require_api_key() {
        let err = TextToSpeech::new_elevenlabs(String::new(), "voice".into(), "model".into())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "ElevenLabs API key required for TTS");

        assert!(TextToSpeech::new_openai(String::new(), "alloy".into(), "tts-1".into()).is_err());
        assert!(TextToSpeech::new_openai("key".into(), "alloy".into(), "tts-1".into()).is_ok());
    }

    #[test]
    fn test_timestamped_response_deserialization() {
        let json = r#"{
            "audio_base64": "AAEC",
            "alignment": {
                "characters": ["o", "k"],
                "character_start_times_seconds": [0.0, 0.1],
                "character_end_times_seconds": [0.1, 0.2]
            },
            "normalized_alignment": null
        }"#;
        let body: TimestampedSpeech = serde_json::from_str(json).unwrap();
        let alignment = body.alignment.unwrap();
        assert_eq!(body.audio_base64, "AAEC");
        assert_eq!(
            word_timings_from_alignment(&alignment.characters, &alignment.character_start_times_seconds),
            vec![WordTiming::new("ok", 0)]
        );
    }
}
