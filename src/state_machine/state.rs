//! Session state types

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

// ============================================================================
// Topics
// ============================================================================

/// Knowledge domain routed to a dedicated assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Subject,
    Rules,
    Schedule,
}

impl Topic {
    /// Keyword matching order. The first keyword contained in an utterance wins.
    pub const ALL: [Topic; 3] = [Topic::Subject, Topic::Rules, Topic::Schedule];

    /// Spoken keyword selecting this topic (lower-case)
    pub fn keyword(self) -> &'static str {
        match self {
            Topic::Subject => "nội dung môn học",
            Topic::Rules => "nội quy",
            Topic::Schedule => "thời khóa biểu",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Subject => "subject",
            Topic::Rules => "rules",
            Topic::Schedule => "schedule",
        }
    }

    /// Find the topic named in a lower-cased utterance
    pub fn detect(utterance: &str) -> Option<Topic> {
        Topic::ALL
            .into_iter()
            .find(|topic| utterance.contains(topic.keyword()))
    }
}

// ============================================================================
// Conversational phase
// ============================================================================

/// Where the conversation is, independent of audio playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    /// Not chatting; waiting for the wake phrase
    #[default]
    Idle,
    /// Chatting, no topic chosen yet
    AwaitingTopic,
    /// Chatting. `None` routes to the default assistant.
    InTopic { topic: Option<Topic> },
    /// Transcript cleared, farewell playing, about to return to `Idle`
    Cooldown,
}

impl Phase {
    pub fn is_chatting(self) -> bool {
        matches!(self, Phase::AwaitingTopic | Phase::InTopic { .. })
    }

    pub fn topic(self) -> Option<Topic> {
        match self {
            Phase::InTopic { topic } => topic,
            _ => None,
        }
    }
}

/// Externally visible status. `Speaking` overlays whatever phase is underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    AwaitingTopic,
    InTopic,
    Speaking,
    Cooldown,
}

// ============================================================================
// Voice, run and playback bookkeeping
// ============================================================================

/// Microphone and speaker flags. Never both true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceState {
    pub listening: bool,
    pub speaking: bool,
}

/// The backend run currently holding the input lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRun {
    /// Locally assigned run number
    pub run: u64,
    /// Incremented each time tool outputs open a continuation stream
    pub segment: u32,
    /// Tool handlers are running; the current stream is expected to close
    pub awaiting_tools: bool,
}

/// Playback in progress plus utterances waiting their turn
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeechQueue {
    pub current: Option<u64>,
    pub queued: VecDeque<String>,
    pub next_id: u64,
}

/// Inactivity timer bookkeeping. Only the newest generation may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerState {
    pub generation: u64,
    pub armed: bool,
}

/// Complete state of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub voice: VoiceState,
    pub pending_run: Option<PendingRun>,
    pub next_run: u64,
    pub speech: SpeechQueue,
    pub timer: TimerState,
    /// A question was asked since the last reset, so the transcript has
    /// turns the inactivity timer must clear even outside a conversation
    pub asked: bool,
    /// Last presence report from the UI
    pub present: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            voice: VoiceState::default(),
            pending_run: None,
            next_run: 1,
            speech: SpeechQueue::default(),
            timer: TimerState::default(),
            asked: false,
            present: true,
        }
    }
}

impl SessionState {
    pub fn input_locked(&self) -> bool {
        self.pending_run.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        if self.voice.speaking {
            return SessionStatus::Speaking;
        }
        match self.phase {
            Phase::Idle => SessionStatus::Idle,
            Phase::AwaitingTopic => SessionStatus::AwaitingTopic,
            Phase::InTopic { .. } => SessionStatus::InTopic,
            Phase::Cooldown => SessionStatus::Cooldown,
        }
    }
}

// ============================================================================
// Context (immutable configuration)
// ============================================================================

/// Fixed phrases spoken or recognized by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    pub wake: String,
    pub change_topic: String,
    pub greeting: String,
    /// Greeting used when topic selection is disabled
    pub open_greeting: String,
    pub clarification: String,
    pub topic_prompt: String,
    pub farewell: Option<String>,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            wake: "xin chào robot".to_string(),
            change_topic: "đổi chủ đề".to_string(),
            greeting: "Xin chào, bạn muốn hỏi về nội dung môn học, nội quy, hay thời khóa biểu?"
                .to_string(),
            open_greeting: "Xin chào, bạn muốn hỏi gì?".to_string(),
            clarification: "Xin lỗi, tôi không hiểu. Bạn có thể chọn nội dung môn học, nội quy, hoặc thời khóa biểu."
                .to_string(),
            topic_prompt: "Bạn muốn hỏi về nội dung môn học, nội quy, hay thời khóa biểu?"
                .to_string(),
            farewell: None,
        }
    }
}

impl Phrases {
    pub fn confirmation(topic: Topic) -> String {
        format!("Bạn đã chọn {}. Hãy đặt câu hỏi.", topic.keyword())
    }
}

/// Context for a session (immutable configuration)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub phrases: Phrases,
    /// When false the wake phrase leads straight to `InTopic` with no topic
    pub require_topic: bool,
    pub inactivity_timeout: Duration,
    /// Shorter timeout used while the UI reports nobody in front of the camera
    pub absence_timeout: Duration,
    /// Pause between playback end and reopening the microphone
    pub resume_delay: Duration,
    pub recognizer_retry_delay: Duration,
    /// Longest wait for the UI to report the end of a clip
    pub playback_timeout: Duration,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            phrases: Phrases::default(),
            require_topic: true,
            inactivity_timeout: Duration::from_secs(180),
            absence_timeout: Duration::from_secs(60),
            resume_delay: Duration::from_millis(500),
            recognizer_retry_delay: Duration::from_millis(500),
            playback_timeout: Duration::from_secs(60),
        }
    }
}
