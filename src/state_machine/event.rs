//! Events that can occur in a session

use crate::assistant::{AssistantEvent, ToolOutput};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Input events
    /// Finalized utterance from the speech input adapter
    Utterance { text: String },
    /// Question typed into the UI form
    TypedMessage { text: String },
    /// Recognition engine ended without being asked to
    RecognizerEnded,
    /// Recognition engine failed to start or errored
    RecognizerFailed,
    /// Retry delay after a recognizer failure elapsed
    RecognizerRetry,
    /// Post-playback delay elapsed; reopen the microphone if still quiet
    ResumeListening,

    // Backend events
    Stream { run: u64, event: AssistantEvent },
    /// A run's stream ended (normally or not)
    StreamClosed { run: u64, segment: u32 },
    ToolOutputsReady {
        run: u64,
        backend_run_id: String,
        outputs: Vec<ToolOutput>,
    },
    BackendFailed { run: u64, message: String },

    // Playback events
    /// Playback ended, failed, or was never confirmed
    PlaybackFinished { playback: u64 },

    // Session events
    InactivityTimeout { generation: u64 },
    PresenceChanged { present: bool },
    EndConversation,
}
