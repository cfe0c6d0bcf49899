//! HTTP API for the classroom assistant UI
//!
//! One session per mounted UI. The UI pushes speech, typed questions and
//! playback reports in; everything the session does comes back over SSE.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::runtime::SessionManager;
use crate::voice::{AudioCache, SpeechApi};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// Direct synthesis for `/api/tts`
    pub speech: Arc<dyn SpeechApi>,
    /// Directory served under `/audio`
    pub audio: AudioCache,
}

impl AppState {
    pub fn new(sessions: SessionManager, speech: Arc<dyn SpeechApi>, audio: AudioCache) -> Self {
        Self {
            sessions: Arc::new(sessions),
            speech,
            audio,
        }
    }
}
