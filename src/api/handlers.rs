//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CreateSessionResponse, ErrorResponse, MessageRequest, PlaybackReport, PresenceRequest,
    RecognizerReport, SaveAudioRequest, SaveAudioResponse, SuccessResponse, TtsRequest,
    UtteranceRequest, UtteranceResponse,
};
use super::AppState;
use crate::assistant::{BackendError, BackendErrorKind};
use crate::runtime::{SessionError, SseEvent};
use crate::state_machine::Event;
use crate::voice::{RecognitionInput, SpeechError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let audio_dir = ServeDir::new(state.audio.dir());

    Router::new()
        .route("/health", get(health))
        .route("/version", get(get_version))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).delete(close_session),
        )
        .route("/api/sessions/:id/stream", get(stream_session))
        // Speech input
        .route("/api/sessions/:id/utterance", post(submit_utterance))
        .route("/api/sessions/:id/audio", post(submit_audio))
        .route("/api/sessions/:id/recognizer", post(report_recognizer))
        // User actions
        .route("/api/sessions/:id/message", post(send_message))
        .route("/api/sessions/:id/playback", post(report_playback))
        .route("/api/sessions/:id/presence", post(report_presence))
        .route("/api/sessions/:id/end", post(end_conversation))
        // Audio and files
        .route("/api/tts", post(text_to_speech))
        .route("/api/save-audio", post(save_audio))
        .route("/api/files/:file_id", get(get_file))
        .nest_service("/audio", audio_dir)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let session_id = state.sessions.create().await?;
    Ok(Json(CreateSessionResponse { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(&id).await?;
    Ok(Json(handle.snapshot()))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.close(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(&id).await?;

    // Subscribe before reading the snapshot so no change falls in between
    let broadcast_rx = handle.subscribe();
    let init_event = SseEvent::Init {
        snapshot: handle.snapshot(),
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// Speech Input
// ============================================================

async fn submit_utterance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UtteranceRequest>,
) -> Result<Json<UtteranceResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let text = handle
        .submit_speech(RecognitionInput::Transcript(req.text))
        .await?;
    Ok(Json(UtteranceResponse {
        accepted: text.is_some(),
        text,
    }))
}

async fn submit_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UtteranceResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("Empty audio segment".to_string()));
    }
    let handle = state.sessions.get(&id).await?;
    let text = handle
        .submit_speech(RecognitionInput::Audio(body.to_vec()))
        .await?;
    Ok(Json(UtteranceResponse {
        accepted: text.is_some(),
        text,
    }))
}

async fn report_recognizer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(report): Json<RecognizerReport>,
) -> Result<Json<SuccessResponse>, AppError> {
    let event = match report {
        RecognizerReport::Ended => Event::RecognizerEnded,
        RecognizerReport::Error { message } => {
            tracing::warn!(session_id = %id, error = %message, "Recognizer reported an error");
            Event::RecognizerFailed
        }
    };
    state.sessions.send_event(&id, event).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// User Actions
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::BadRequest("Message is empty".to_string()));
    }

    let handle = state.sessions.get(&id).await?;
    if handle.snapshot().input_locked {
        return Err(AppError::Conflict(
            "A question is already being answered".to_string(),
        ));
    }

    handle.send(Event::TypedMessage { text }).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn report_playback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(report): Json<PlaybackReport>,
) -> Result<Json<SuccessResponse>, AppError> {
    if let Some(error) = &report.error {
        tracing::warn!(session_id = %id, playback = report.id, error = %error, "UI playback failed");
    }
    state
        .sessions
        .send_event(
            &id,
            Event::PlaybackFinished {
                playback: report.id,
            },
        )
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn report_presence(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .sessions
        .send_event(&id, Event::PresenceChanged { present: req.present })
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.send_event(&id, Event::EndConversation).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Audio and Files
// ============================================================

async fn text_to_speech(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Result<Response, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("Missing content".to_string()));
    }
    let audio = state
        .speech
        .synthesize(&req.content)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

async fn save_audio(
    State(state): State<AppState>,
    Json(req): Json<SaveAudioRequest>,
) -> Result<Json<SaveAudioResponse>, AppError> {
    let (Some(file_name), Some(blob)) = (req.file_name, req.audio_blob) else {
        return Err(AppError::BadRequest(
            "Missing fileName or audioBlob".to_string(),
        ));
    };

    // Accept both bare base64 and data URLs
    let encoded = blob.split_once(',').map_or(blob.as_str(), |(_, data)| data);
    let audio = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::BadRequest(format!("audioBlob is not valid base64: {e}")))?;

    let file_path = state
        .audio
        .save(&file_name, &audio)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidInput => AppError::BadRequest(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    tracing::info!(file = %file_path, bytes = audio.len(), "Saved audio");
    Ok(Json(SaveAudioResponse {
        message: "Audio saved".to_string(),
        file_path,
    }))
}

async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    let file = state.sessions.backend().file_content(&file_id).await?;
    let content_type = file
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], file.bytes).into_response())
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Speech(SpeechError::Unsupported(_)) => AppError::BadRequest(e.to_string()),
            SessionError::Backend(e) => e.into(),
            SessionError::Closed | SessionError::Speech(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        match e.kind {
            BackendErrorKind::InvalidRequest => AppError::NotFound(e.message),
            _ => AppError::Internal(e.message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
