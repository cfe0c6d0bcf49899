//! Runtime for executing sessions
//!
//! Each mounted UI gets one session: a task owning the state machine, the
//! transcript and the voice adapters. HTTP handlers talk to it through a
//! [`SessionHandle`].

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{submit_speech, SessionRuntime};
pub use traits::*;

use crate::assistant::{AssistantBackend, BackendError};
use crate::state_machine::{Event, SessionContext, SessionState, SessionStatus, Topic};
use crate::transcript::{Transcript, Turn};
use crate::voice::{
    CaptureMode, RecognitionInput, Recognizer, RecognizerKind, SpeechError, SpeechInputAdapter,
    SpeechOutputAdapter, Synthesizer, VoiceGate,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<
    Arc<dyn AssistantBackend>,
    Arc<dyn Recognizer>,
    Arc<dyn Synthesizer>,
    Arc<dyn ToolHandler>,
>;

/// Events sent to SSE clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseEvent {
    Init {
        snapshot: SessionSnapshot,
    },
    TurnAppended {
        index: usize,
        turn: Turn,
    },
    /// The turn at `index` changed while a response streamed into it
    TurnUpdated {
        index: usize,
        turn: Turn,
    },
    TranscriptCleared,
    Status {
        status: SessionStatus,
        topic: Option<Topic>,
        input_locked: bool,
        listening: bool,
        speaking: bool,
    },
    /// Clip the UI must play, then report with the same `playback` id
    Play {
        playback: u64,
        src: String,
        text: String,
    },
    /// Open or close the UI's microphone
    Microphone {
        active: bool,
        capture: CaptureMode,
        locale: String,
    },
    /// An utterance was dropped while a question was being answered
    Busy {
        text: String,
    },
    Error {
        message: String,
    },
}

impl SseEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            SseEvent::Init { .. } => "init",
            SseEvent::TurnAppended { .. } => "turn_appended",
            SseEvent::TurnUpdated { .. } => "turn_updated",
            SseEvent::TranscriptCleared => "transcript_cleared",
            SseEvent::Status { .. } => "status",
            SseEvent::Play { .. } => "play",
            SseEvent::Microphone { .. } => "microphone",
            SseEvent::Busy { .. } => "busy",
            SseEvent::Error { .. } => "error",
        }
    }
}

/// Point-in-time view of a session, served to newly attached clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub topic: Option<Topic>,
    pub input_locked: bool,
    pub listening: bool,
    pub speaking: bool,
    pub transcript: Vec<Turn>,
}

impl SessionSnapshot {
    pub fn capture(session_id: &str, state: &SessionState, transcript: &Transcript) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: state.status(),
            topic: state.phase.topic(),
            input_locked: state.input_locked(),
            listening: state.voice.listening,
            speaking: state.voice.speaking,
            transcript: transcript.turns().to_vec(),
        }
    }

    /// Status event for this snapshot
    pub fn status_event(&self) -> SseEvent {
        SseEvent::Status {
            status: self.status,
            topic: self.topic,
            input_locked: self.input_locked,
            listening: self.listening,
            speaking: self.speaking,
        }
    }

    fn same_status(&self, other: &Self) -> bool {
        self.status == other.status
            && self.topic == other.topic
            && self.input_locked == other.input_locked
            && self.listening == other.listening
            && self.speaking == other.speaking
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session has stopped")]
    Closed,
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    input: Arc<SpeechInputAdapter<Arc<dyn Recognizer>>>,
    cancel: CancellationToken,
    /// Milliseconds since the manager started, at the last lookup
    last_seen: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn send(&self, event: Event) -> Result<(), SessionError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Finalize recognizer input and hand the utterance to the session.
    /// Returns the accepted text, or `None` when the input was discarded.
    pub async fn submit_speech(
        &self,
        input: RecognitionInput,
    ) -> Result<Option<String>, SessionError> {
        submit_speech(&self.input, &self.event_tx, input).await
    }
}

/// Capabilities shared by every session
pub struct Services {
    pub backend: Arc<dyn AssistantBackend>,
    pub tools: Arc<dyn ToolHandler>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub recognizer: RecognizerKind,
    pub device: Option<Arc<dyn DeviceLink>>,
    /// Template; the session id is filled in per session
    pub context: SessionContext,
}

/// Manager for all session runtimes
pub struct SessionManager {
    services: Services,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    started: Instant,
}

impl SessionManager {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Create a backend thread and start a session runtime for it
    pub async fn create(&self) -> Result<String, SessionError> {
        let thread = self.services.backend.create_thread().await?;
        let session_id = uuid::Uuid::new_v4().to_string();

        let mut context = self.services.context.clone();
        context.session_id.clone_from(&session_id);

        let (event_tx, event_rx) = mpsc::channel(64);
        let (broadcast_tx, _) = broadcast::channel(256);
        let initial = SessionSnapshot::capture(&session_id, &SessionState::default(), &Transcript::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let gate = Arc::new(VoiceGate::new());
        let recognizer = self.services.recognizer.build(broadcast_tx.clone());
        let input = Arc::new(SpeechInputAdapter::new(recognizer, gate.clone()));
        let output = SpeechOutputAdapter::new(self.services.synthesizer.clone(), gate);

        let runtime: ProductionRuntime = SessionRuntime::new(
            context,
            thread,
            self.services.backend.clone(),
            input.clone(),
            output,
            self.services.tools.clone(),
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
            snapshot_tx,
        )
        .with_device(self.services.device.clone())
        .with_cancellation(cancel.clone());

        let id = session_id.clone();
        tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "Session runtime finished");
        });

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionHandle {
                event_tx,
                broadcast_tx,
                snapshot: snapshot_rx,
                input,
                cancel,
                last_seen: Arc::new(AtomicU64::new(self.now_ms())),
            },
        );
        tracing::info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        let handle = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.last_seen.store(self.now_ms(), Ordering::Relaxed);
        Ok(handle)
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), SessionError> {
        self.get(session_id).await?.send(event).await
    }

    /// Stop a session's runtime and forget it
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        handle.cancel.cancel();
        Ok(())
    }

    /// Close sessions with no event stream attached that nobody has looked
    /// up for `idle`. A UI that vanished without closing its session ends here.
    pub async fn evict_idle(&self, idle: Duration) -> Vec<String> {
        let now = self.now_ms();
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        let mut sessions = self.sessions.write().await;

        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| {
                handle.broadcast_tx.receiver_count() == 0
                    && now.saturating_sub(handle.last_seen.load(Ordering::Relaxed)) >= idle_ms
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(handle) = sessions.remove(id) {
                handle.cancel.cancel();
                tracing::info!(session_id = %id, "Evicted idle session");
            }
        }
        stale
    }

    /// Sweep for idle sessions in the background
    pub fn spawn_eviction(self: &Arc<Self>, idle: Duration) {
        let manager = Arc::clone(self);
        let period = idle.clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the first immediate tick
            interval.tick().await;
            loop {
                interval.tick().await;
                manager.evict_idle(idle).await;
            }
        });
    }

    pub fn backend(&self) -> &Arc<dyn AssistantBackend> {
        &self.services.backend
    }
}
