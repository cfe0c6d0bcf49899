//! Robot chat - voice classroom assistant
//!
//! Serves the classroom UI's API: one conversation session per mounted UI,
//! answered by hosted assistants and spoken back through the robot.

mod api;
mod assistant;
mod config;
mod link;
mod runtime;
mod state_machine;
mod tools;
mod transcript;
mod voice;

use api::{create_router, AppState};
use assistant::{AssistantBackend, LoggingBackend, OpenAiAssistants};
use config::{Config, RecognizerMode, SynthesizerMode};
use link::ConnectionManager;
use runtime::{DeviceLink, Services, SessionManager, ToolHandler};
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice::{
    AudioCache, LocalSynthesizer, OpenAiSpeech, RecognizerKind, RemoteSynthesizer, SpeechApi,
    Synthesizer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robot_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Hosted assistants
    let mut assistants =
        OpenAiAssistants::new(config.openai_api_key.clone(), config.assistants.clone())?;
    if let Some(base_url) = &config.openai_base_url {
        assistants = assistants.with_base_url(base_url.clone());
    }
    let backend: Arc<dyn AssistantBackend> = Arc::new(LoggingBackend::new(assistants));

    // Speech
    let voice = &config.voice;
    let speech = Arc::new(OpenAiSpeech::new(
        config.openai_api_key.clone(),
        voice.tts_model.clone(),
        voice.tts_voice.clone(),
        voice.tts_speed,
        &voice.locale,
    ));
    let audio = AudioCache::new(&voice.audio_dir, "/audio");
    tokio::fs::create_dir_all(audio.dir()).await?;

    let synthesizer: Arc<dyn Synthesizer> = match voice.synthesizer {
        SynthesizerMode::Remote => {
            let cache = voice.cache_audio.then(|| audio.clone());
            Arc::new(RemoteSynthesizer::new(speech.clone(), cache))
        }
        SynthesizerMode::Local => {
            let link = ConnectionManager::spawn(
                "tts",
                voice.local_tts_url.clone(),
                config.link_reconnect_delay,
            );
            Arc::new(LocalSynthesizer::new(Arc::new(link), voice.local_tts_timeout))
        }
    };

    let recognizer = match voice.recognizer {
        RecognizerMode::Browser => RecognizerKind::Browser {
            locale: voice.locale.clone(),
        },
        RecognizerMode::Whisper => RecognizerKind::Whisper {
            speech: speech.clone(),
            locale: voice.locale.clone(),
        },
    };

    // Robot hardware
    let device = config.device_url.clone().map(|url| {
        Arc::new(ConnectionManager::spawn("device", url, config.link_reconnect_delay))
            as Arc<dyn DeviceLink>
    });
    if device.is_none() {
        tracing::warn!("Device link disabled; wake and reset will not signal the robot");
    }

    // The assistants must declare the same functions for the calls to reach us
    let registry = ToolRegistry::with_builtins();
    tracing::info!(
        functions = %serde_json::to_string(&registry.definitions())?,
        "Function tools registered"
    );
    let tools: Arc<dyn ToolHandler> = Arc::new(registry);

    tracing::info!(
        recognizer = ?voice.recognizer,
        synthesizer = ?voice.synthesizer,
        require_topic = config.session.require_topic,
        "Voice configured"
    );

    let sessions = SessionManager::new(Services {
        backend,
        tools,
        synthesizer,
        recognizer,
        device,
        context: config.session.context(),
    });
    let state = AppState::new(sessions, speech as Arc<dyn SpeechApi>, audio);
    state.sessions.spawn_eviction(config.session_idle_timeout);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Robot chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
