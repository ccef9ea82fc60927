//! Clarify API server.
//!
//! Reads configuration, wires the chat and speech clients into a
//! `TurnOrchestrator`, and serves the HTTP API until Ctrl+C.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use clarify_api::{
    config::{Config, Provider, TtsProvider},
    router::create_router,
    sessions::SessionStore,
    state::AppState,
};
use clarify_core::{
    llm_client::{LLMClient, OpenAICompatibleClient},
    orchestrator::TurnOrchestrator,
    speech::{SpeechSynthesizer, TextToSpeech},
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, draining connections"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl+C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn read_system_prompt(prompts_path: &Path) -> anyhow::Result<String> {
    let path = prompts_path.join("system_prompt.md");
    let prompt = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(prompt.trim().to_string())
}

fn build_llm_client(config: &Config) -> anyhow::Result<Arc<dyn LLMClient>> {
    let (api_key, api_base) = match config.provider {
        Provider::OpenAI => (&config.openai_api_key, OPENAI_API_BASE),
        Provider::Gemini => (&config.gemini_api_key, GEMINI_API_BASE),
    };
    let api_key = api_key
        .as_deref()
        .context("No API key for the configured LLM provider")?;

    let client = OpenAICompatibleClient::new(
        OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base),
        config.chat_model.clone(),
        config.max_tokens,
    );
    Ok(Arc::new(client))
}

fn build_synthesizer(config: &Config) -> anyhow::Result<Arc<dyn SpeechSynthesizer>> {
    let voice = config.tts_voice.clone();
    let model = config.tts_model.clone();
    let tts = match config.tts_provider {
        TtsProvider::ElevenLabs => TextToSpeech::new_elevenlabs(
            config.elevenlabs_api_key.clone().unwrap_or_default(),
            voice,
            model,
        ),
        TtsProvider::OpenAI => TextToSpeech::new_openai(
            config.openai_api_key.clone().unwrap_or_default(),
            voice,
            model,
        ),
    }
    .context("Failed to set up speech synthesis")?;
    Ok(Arc::new(tts))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let system_prompt = read_system_prompt(&config.prompts_path)?;
    let orchestrator = TurnOrchestrator::new(build_llm_client(&config)?, build_synthesizer(&config)?)
        .with_timeout(config.upstream_timeout);

    let state = Arc::new(AppState {
        sessions: Arc::new(SessionStore::new()),
        orchestrator: Arc::new(orchestrator),
        system_prompt: Arc::new(system_prompt),
    });

    let app = create_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!(
        address = %config.bind_address,
        llm = ?config.provider,
        model = %config.chat_model,
        tts = ?config.tts_provider,
        timeout = ?config.upstream_timeout,
        "Clarify API listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}
