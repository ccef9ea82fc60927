//! Service configuration, read once from the environment at startup.

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset; carries the variable name and what needs it.
    #[error("{0} must be set ({1})")]
    MissingVar(&'static str, &'static str),
    #[error("{0} has an invalid value: {1}")]
    InvalidValue(&'static str, String),
}

/// Chat completion backend. Both speak the OpenAI wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown LLM provider '{other}'")),
        }
    }
}

/// Speech synthesis backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    /// Audio plus word timings.
    ElevenLabs,
    /// Audio only.
    OpenAI,
}

impl TtsProvider {
    fn default_voice(self) -> &'static str {
        match self {
            Self::ElevenLabs => "21m00Tcm4TlvDq8ikWAM",
            Self::OpenAI => "alloy",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::ElevenLabs => "eleven_multilingual_v2",
            Self::OpenAI => "tts-1",
        }
    }
}

impl FromStr for TtsProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAI),
            other => Err(format!("unknown TTS provider '{other}'")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub chat_model: String,
    pub max_tokens: u32,
    pub tts_provider: TtsProvider,
    pub elevenlabs_api_key: Option<String>,
    pub tts_voice: String,
    pub tts_model: String,
    /// Bound on every generation and synthesis call.
    pub upstream_timeout: Duration,
    pub log_level: Level,
    /// Directory of `*.md` prompts; `system_prompt.md` seeds each session.
    pub prompts_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parses `name` if set, otherwise yields `default`.
fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

fn require(
    key: &Option<String>,
    name: &'static str,
    needed_by: &'static str,
) -> Result<(), ConfigError> {
    match key {
        Some(_) => Ok(()),
        None => Err(ConfigError::MissingVar(name, needed_by)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A developer's .env would leak into the env-driven tests below.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let provider = parse_var("LLM_PROVIDER", Provider::OpenAI)?;
        let tts_provider = parse_var("TTS_PROVIDER", TtsProvider::ElevenLabs)?;

        let openai_api_key = env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = env::var("GEMINI_API_KEY").ok();
        let elevenlabs_api_key = env::var("ELEVENLABS_API_KEY").ok();

        match provider {
            Provider::OpenAI => require(&openai_api_key, "OPENAI_API_KEY", "LLM_PROVIDER=openai")?,
            Provider::Gemini => require(&gemini_api_key, "GEMINI_API_KEY", "LLM_PROVIDER=gemini")?,
        }
        match tts_provider {
            TtsProvider::ElevenLabs => require(
                &elevenlabs_api_key,
                "ELEVENLABS_API_KEY",
                "TTS_PROVIDER=elevenlabs",
            )?,
            TtsProvider::OpenAI => {
                require(&openai_api_key, "OPENAI_API_KEY", "TTS_PROVIDER=openai")?
            }
        }

        let timeout_secs: u64 = parse_var("UPSTREAM_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_TIMEOUT_SECS",
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address: parse_var("BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            provider,
            openai_api_key,
            gemini_api_key,
            chat_model: var_or("CHAT_MODEL", "gpt-3.5-turbo"),
            max_tokens: parse_var("MAX_TOKENS", 150)?,
            tts_provider,
            elevenlabs_api_key,
            tts_voice: var_or("TTS_VOICE", tts_provider.default_voice()),
            tts_model: var_or("TTS_MODEL", tts_provider.default_model()),
            upstream_timeout: Duration::from_secs(timeout_secs),
            log_level: parse_var("RUST_LOG", Level::INFO)?,
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "./prompts")),
        })
    }
}
