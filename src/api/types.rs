//! API request and response types

use serde::{Deserialize, Serialize};

/// Response for session creation
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// Finalized transcript from the browser's recognition engine
#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
}

/// Outcome of handing speech to a session
#[derive(Debug, Serialize)]
pub struct UtteranceResponse {
    /// False when the microphone was closed and the input was discarded
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Recognizer lifecycle report from the UI
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognizerReport {
    Ended,
    Error { message: String },
}

/// Typed question
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// The UI finished (or failed) playing a clip
#[derive(Debug, Deserialize)]
pub struct PlaybackReport {
    pub id: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub present: bool,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub content: String,
}

/// Upload of a recorded or synthesized clip. Fields are optional so a
/// missing one is reported as a 400 with a message rather than a
/// deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAudioRequest {
    pub file_name: Option<String>,
    /// Base64 encoded audio bytes
    pub audio_blob: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAudioResponse {
    pub message: String,
    pub file_path: String,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
