//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::executor::{submit_speech, SessionRuntime};
use super::traits::DeviceLink;
use super::{SessionSnapshot, SseEvent};
use crate::assistant::{
    AssistantBackend, AssistantEvent, BackendError, EventStream, FileContent, ThreadHandle,
    ToolOutput,
};
use crate::link::{DeviceCommand, LinkError};
use crate::state_machine::{Event, SessionContext, SessionState, Topic};
use crate::tools::ToolRegistry;
use crate::transcript::Transcript;
use crate::voice::{
    RecognitionInput, Recognizer, Rendering, SpeechApi, SpeechError, SpeechInputAdapter,
    SpeechOutputAdapter, Synthesizer, VoiceGate,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

// ============================================================================
// Mock Assistant Backend
// ============================================================================

type Script = Result<Vec<Result<AssistantEvent, BackendError>>, BackendError>;

/// Backend that replays queued event scripts
#[derive(Default)]
pub struct MockBackend {
    answers: Mutex<VecDeque<(Script, bool)>>,
    continuations: Mutex<VecDeque<Script>>,
    /// Record of every posted question
    questions: Mutex<Vec<(String, Option<Topic>)>>,
    /// Record of every tool output submission, by backend run id
    submissions: Mutex<Vec<(String, Vec<ToolOutput>)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the stream answering the next question
    pub fn queue_answer(&self, events: Vec<AssistantEvent>) {
        let script = Ok(events.into_iter().map(Ok).collect());
        self.answers.lock().unwrap().push_back((script, false));
    }

    /// Queue a stream that delivers `events` and then never ends
    pub fn queue_stalled(&self, events: Vec<AssistantEvent>) {
        let script = Ok(events.into_iter().map(Ok).collect());
        self.answers.lock().unwrap().push_back((script, true));
    }

    /// Queue a failure for the next question
    pub fn queue_failure(&self, error: BackendError) {
        self.answers.lock().unwrap().push_back((Err(error), false));
    }

    /// Queue the stream returned after tool outputs are submitted
    pub fn queue_continuation(&self, events: Vec<AssistantEvent>) {
        let script = Ok(events.into_iter().map(Ok).collect());
        self.continuations.lock().unwrap().push_back(script);
    }

    pub fn questions(&self) -> Vec<(String, Option<Topic>)> {
        self.questions.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<(String, Vec<ToolOutput>)> {
        self.submissions.lock().unwrap().clone()
    }
}

fn into_stream(script: Script, stall: bool) -> Result<EventStream, BackendError> {
    let items = futures::stream::iter(script?);
    if stall {
        Ok(Box::pin(items.chain(futures::stream::pending())))
    } else {
        Ok(Box::pin(items))
    }
}

#[async_trait]
impl AssistantBackend for MockBackend {
    async fn create_thread(&self) -> Result<ThreadHandle, BackendError> {
        Ok(ThreadHandle("thread_test".to_string()))
    }

    async fn post_message(
        &self,
        _thread: &ThreadHandle,
        text: &str,
        topic: Option<Topic>,
    ) -> Result<EventStream, BackendError> {
        self.questions
            .lock()
            .unwrap()
            .push((text.to_string(), topic));
        let (script, stall) = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| (Err(BackendError::invalid_request("No mock answer queued")), false));
        into_stream(script, stall)
    }

    async fn submit_tool_outputs(
        &self,
        _thread: &ThreadHandle,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, BackendError> {
        self.submissions
            .lock()
            .unwrap()
            .push((run_id.to_string(), outputs.to_vec()));
        let script = self
            .continuations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::invalid_request("No mock continuation queued")));
        into_stream(script, false)
    }

    async fn file_content(&self, file_id: &str) -> Result<FileContent, BackendError> {
        if file_id == "missing" {
            return Err(BackendError::invalid_request("No such file"));
        }
        Ok(FileContent {
            bytes: b"ngay,mon\nthu hai,toan\n".to_vec(),
            content_type: Some("text/csv".to_string()),
        })
    }
}

// ============================================================================
// Mock voice capabilities
// ============================================================================

/// Recognizer that counts start/stop calls. Audio input "transcribes" to
/// its UTF-8 contents.
#[derive(Default)]
pub struct MockRecognizer {
    starts: AtomicUsize,
    stops: AtomicUsize,
    failing_starts: AtomicUsize,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `count` start attempts fail, as a denied microphone would
    pub fn failing_starts(count: usize) -> Self {
        Self {
            failing_starts: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn start(&self) -> Result<(), SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(SpeechError::Recognition("microphone unavailable".into()));
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn finalize(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError> {
        Ok(Some(match input {
            RecognitionInput::Transcript(text) => text,
            RecognitionInput::Audio(audio) => String::from_utf8_lossy(&audio).into_owned(),
        }))
    }
}

/// Speech API returning a fixed clip and counting calls
#[derive(Default)]
pub struct CountingSpeechApi {
    calls: AtomicUsize,
}

impl CountingSpeechApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechApi for CountingSpeechApi {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"ID3\x04mock-mp3".to_vec())
    }
}

/// Synthesizer that records what it was asked to say. Either completes
/// immediately or hands back a clip the "UI" has to report.
#[derive(Default)]
pub struct MockSynthesizer {
    clips: bool,
    spoken: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clips() -> Self {
        Self {
            clips: true,
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn render(&self, text: &str) -> Result<Rendering, SpeechError> {
        let mut spoken = self.spoken.lock().unwrap();
        spoken.push(text.to_string());
        if self.clips {
            Ok(Rendering::Clip {
                src: format!("/audio/clip-{}.mp3", spoken.len()),
            })
        } else {
            Ok(Rendering::Completed)
        }
    }
}

/// Device link recording every command
#[derive(Default)]
pub struct MockDevice {
    commands: Mutex<Vec<DeviceCommand>>,
}

impl MockDevice {
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl DeviceLink for MockDevice {
    fn signal(&self, command: DeviceCommand) -> Result<(), LinkError> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

type MockInput = SpeechInputAdapter<Arc<MockRecognizer>>;

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_rx: broadcast::Receiver<SseEvent>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    input: Arc<MockInput>,
    pub backend: Arc<MockBackend>,
    pub recognizer: Arc<MockRecognizer>,
    pub synthesizer: Arc<MockSynthesizer>,
    pub device: Arc<MockDevice>,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    /// Create a test runtime builder with instant mocks
    pub fn builder() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }
}

pub struct TestRuntimeBuilder {
    context: SessionContext,
    backend: MockBackend,
    recognizer: MockRecognizer,
    synthesizer: MockSynthesizer,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        let mut context = SessionContext::new("test-session");
        context.resume_delay = Duration::from_millis(10);
        Self {
            context,
            backend: MockBackend::new(),
            recognizer: MockRecognizer::new(),
            synthesizer: MockSynthesizer::new(),
        }
    }

    pub fn context(mut self, f: impl FnOnce(&mut SessionContext)) -> Self {
        f(&mut self.context);
        self
    }

    pub fn backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn recognizer(mut self, recognizer: MockRecognizer) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Playback produces clips that must be reported back
    pub fn clips(mut self) -> Self {
        self.synthesizer = MockSynthesizer::with_clips();
        self
    }

    pub fn build(self) -> TestRuntime {
        let backend = Arc::new(self.backend);
        let recognizer = Arc::new(self.recognizer);
        let synthesizer = Arc::new(self.synthesizer);
        let device = Arc::new(MockDevice::default());

        let gate = Arc::new(VoiceGate::new());
        let input = Arc::new(SpeechInputAdapter::new(recognizer.clone(), gate.clone()));
        let output = SpeechOutputAdapter::new(synthesizer.clone(), gate);

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(256);
        let initial = SessionSnapshot::capture(
            &self.context.session_id,
            &SessionState::default(),
            &Transcript::new(),
        );
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let runtime = SessionRuntime::new(
            self.context,
            ThreadHandle("thread_test".to_string()),
            backend.clone(),
            input.clone(),
            output,
            ToolRegistry::with_builtins(),
            event_rx,
            event_tx.clone(),
            broadcast_tx,
            snapshot_tx,
        )
        .with_device(Some(device.clone() as Arc<dyn DeviceLink>));

        let handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            event_tx,
            broadcast_rx,
            snapshot_rx,
            input,
            backend,
            recognizer,
            synthesizer,
            device,
            _runtime_handle: handle,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const WAIT: Duration = Duration::from_secs(5);

impl TestRuntime {
    /// Speak into the microphone. Returns the accepted utterance.
    pub async fn say(&self, text: &str) -> Option<String> {
        submit_speech(
            &self.input,
            &self.event_tx,
            RecognitionInput::Transcript(text.to_string()),
        )
        .await
        .expect("Failed to submit speech")
    }

    pub async fn send(&self, event: Event) {
        self.event_tx
            .send(event)
            .await
            .expect("Failed to send event");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait until the published snapshot satisfies `predicate`
    pub async fn wait_for_within(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> bool {
        let mut rx = self.snapshot_rx.clone();
        let result = tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await;
        matches!(result, Ok(Ok(_)))
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&SessionSnapshot) -> bool) -> bool {
        self.wait_for_within(WAIT, predicate).await
    }

    /// The runtime opened the microphone at startup
    pub async fn ready(&self) -> bool {
        self.wait_for(|s| s.listening).await
    }

    /// Receive broadcast events until one matches
    pub async fn expect_event(
        &mut self,
        mut predicate: impl FnMut(&SseEvent) -> bool,
    ) -> Option<SseEvent> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            match tokio::time::timeout_at(deadline, self.broadcast_rx.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Some(event),
                Ok(Ok(_) | Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::ToolCallRequest;
    use crate::state_machine::SessionStatus;
    use crate::transcript::{Role, Turn};

    fn open_topics(context: &mut SessionContext) {
        context.require_topic = false;
    }

    fn answer(text: &str) -> Vec<AssistantEvent> {
        vec![
            AssistantEvent::TextCreated,
            AssistantEvent::TextDelta {
                value: text.to_string(),
                annotations: vec![],
            },
            AssistantEvent::TextDone {
                text: text.to_string(),
            },
            AssistantEvent::RunCompleted,
        ]
    }

    /// Wake the robot and wait until it listens again in the chatting phase
    async fn wake(rt: &TestRuntime, expected: SessionStatus) {
        assert!(rt.ready().await);
        assert_eq!(
            rt.say("Xin chào robot").await.as_deref(),
            Some("Xin chào robot")
        );
        assert!(rt.wait_for(|s| s.status == expected && s.listening).await);
    }

    #[tokio::test]
    async fn test_mock_backend_replays_scripts() {
        let backend = MockBackend::new();
        backend.queue_answer(answer("hi"));
        let thread = backend.create_thread().await.unwrap();

        let events: Vec<_> = backend
            .post_message(&thread, "hello", Some(Topic::Rules))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 4);
        assert!(backend.post_message(&thread, "again", None).await.is_err());
        assert_eq!(
            backend.questions(),
            vec![
                ("hello".to_string(), Some(Topic::Rules)),
                ("again".to_string(), None)
            ]
        );
    }

    /// Integration test: wake, choose a topic, ask, hear the answer
    #[tokio::test]
    async fn test_full_voice_flow() {
        let backend = MockBackend::new();
        backend.queue_answer(vec![
            AssistantEvent::TextCreated,
            AssistantEvent::TextDelta {
                value: "Vào lớp lúc ".to_string(),
                annotations: vec![],
            },
            AssistantEvent::TextDelta {
                value: "7 giờ.".to_string(),
                annotations: vec![],
            },
            AssistantEvent::TextDone {
                text: "Vào lớp lúc 7 giờ.".to_string(),
            },
            AssistantEvent::RunCompleted,
        ]);
        let rt = TestRuntime::builder().backend(backend).build();

        wake(&rt, SessionStatus::AwaitingTopic).await;
        rt.say("nội quy").await;
        assert!(
            rt.wait_for(|s| s.topic == Some(Topic::Rules) && s.listening)
                .await
        );

        rt.say("Giờ vào lớp là mấy giờ?").await;
        assert!(
            rt.wait_for(|s| s.transcript.len() == 5 && !s.input_locked && s.listening)
                .await
        );

        let snapshot = rt.snapshot();
        assert_eq!(
            snapshot.transcript[3],
            Turn::new(Role::User, "Giờ vào lớp là mấy giờ?")
        );
        assert_eq!(
            snapshot.transcript[4],
            Turn::new(Role::Assistant, "Vào lớp lúc 7 giờ.")
        );
        assert_eq!(
            rt.backend.questions(),
            vec![("Giờ vào lớp là mấy giờ?".to_string(), Some(Topic::Rules))]
        );
        let spoken = rt.synthesizer.spoken();
        assert_eq!(spoken.len(), 3);
        assert_eq!(spoken[2], "Vào lớp lúc 7 giờ.");
        assert_eq!(rt.device.commands(), vec![DeviceCommand::On]);
        // closed for each of the three playbacks
        assert_eq!(rt.recognizer.stops(), 3);
    }

    /// A microphone that fails to open is retried and then hears speech
    #[tokio::test]
    async fn test_failed_microphone_start_is_retried() {
        let rt = TestRuntime::builder()
            .recognizer(MockRecognizer::failing_starts(1))
            .context(|c| c.recognizer_retry_delay = Duration::from_millis(10))
            .build();
        assert!(rt.ready().await);

        let reopened = tokio::time::timeout(WAIT, async {
            while rt.recognizer.starts() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(reopened.is_ok());

        assert_eq!(
            rt.say("Xin chào robot").await.as_deref(),
            Some("Xin chào robot")
        );
        assert!(rt.wait_for(|s| s.status == SessionStatus::AwaitingTopic).await);
    }

    /// Integration test: a failed request unlocks input and reports the error
    #[tokio::test]
    async fn test_backend_failure_unlocks_input() {
        let backend = MockBackend::new();
        backend.queue_failure(BackendError::server_error("upstream unavailable"));
        backend.queue_answer(answer("Có."));
        let mut rt = TestRuntime::builder()
            .context(open_topics)
            .backend(backend)
            .build();

        wake(&rt, SessionStatus::InTopic).await;
        rt.say("Hôm nay có học không?").await;

        let error = rt
            .expect_event(|e| matches!(e, SseEvent::Error { .. }))
            .await;
        assert!(matches!(
            error,
            Some(SseEvent::Error { message }) if message == "upstream unavailable"
        ));
        assert!(
            rt.wait_for(|s| s.transcript.len() == 3 && !s.input_locked)
                .await
        );

        // the next question goes through
        rt.say("Hôm nay có học không?").await;
        assert!(
            rt.wait_for(|s| s.transcript.len() == 5 && !s.input_locked)
                .await
        );
        assert_eq!(rt.backend.questions().len(), 2);
    }

    /// Integration test: function call answered locally, continuation consumed
    #[tokio::test]
    async fn test_tool_round_trip() {
        let backend = MockBackend::new();
        backend.queue_answer(vec![AssistantEvent::ActionRequired {
            run_id: "run_1".to_string(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                name: "get_current_time".to_string(),
                arguments: "{}".to_string(),
            }],
        }]);
        backend.queue_continuation(answer("Hôm nay là thứ Ba."));
        let rt = TestRuntime::builder()
            .context(open_topics)
            .backend(backend)
            .build();

        wake(&rt, SessionStatus::InTopic).await;
        rt.say("Hôm nay là thứ mấy?").await;
        assert!(
            rt.wait_for(|s| s.transcript.len() == 4 && !s.input_locked && s.listening)
                .await
        );

        let submissions = rt.backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, "run_1");
        assert_eq!(submissions[0].1[0].tool_call_id, "call_1");
        assert!(submissions[0].1[0].output.contains("weekday"));
        assert_eq!(
            rt.snapshot().transcript[3],
            Turn::new(Role::Assistant, "Hôm nay là thứ Ba.")
        );
    }

    /// Integration test: speech while a question is pending is dropped with a notice
    #[tokio::test]
    async fn test_busy_notice_while_locked() {
        let backend = MockBackend::new();
        backend.queue_stalled(vec![AssistantEvent::TextCreated]);
        let mut rt = TestRuntime::builder()
            .context(open_topics)
            .backend(backend)
            .build();

        wake(&rt, SessionStatus::InTopic).await;
        rt.say("Câu hỏi một").await;
        assert!(rt.wait_for(|s| s.input_locked).await);

        rt.say("Câu hỏi hai").await;
        let busy = rt
            .expect_event(|e| matches!(e, SseEvent::Busy { .. }))
            .await;
        assert!(matches!(busy, Some(SseEvent::Busy { text }) if text == "Câu hỏi hai"));

        rt.send(Event::TypedMessage {
            text: "Câu hỏi ba".to_string(),
        })
        .await;
        assert!(rt
            .expect_event(|e| matches!(e, SseEvent::Error { .. }))
            .await
            .is_some());
        assert_eq!(rt.backend.questions().len(), 1);
    }

    /// Integration test: inactivity clears the transcript and turns the device off
    #[tokio::test(start_paused = true)]
    async fn test_inactivity_timeout_resets_session() {
        let mut rt = TestRuntime::builder().build();
        // the timer is armed when the greeting ends, before wake() returns
        let start = tokio::time::Instant::now();
        wake(&rt, SessionStatus::AwaitingTopic).await;

        assert!(
            rt.wait_for_within(Duration::from_secs(600), |s| {
                s.status == SessionStatus::Idle && s.transcript.is_empty()
            })
            .await
        );
        assert!(start.elapsed() >= Duration::from_secs(180));
        assert_eq!(
            rt.device.commands(),
            vec![DeviceCommand::On, DeviceCommand::Off]
        );
        assert!(rt
            .expect_event(|e| matches!(e, SseEvent::TranscriptCleared))
            .await
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_absence_shortens_timeout() {
        let rt = TestRuntime::builder().build();
        wake(&rt, SessionStatus::AwaitingTopic).await;

        let start = tokio::time::Instant::now();
        rt.send(Event::PresenceChanged { present: false }).await;
        assert!(
            rt.wait_for_within(Duration::from_secs(600), |s| s.status == SessionStatus::Idle)
                .await
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_farewell_then_idle() {
        let rt = TestRuntime::builder()
            .context(|c| c.phrases.farewell = Some("Tạm biệt!".to_string()))
            .build();
        wake(&rt, SessionStatus::AwaitingTopic).await;

        assert!(
            rt.wait_for_within(Duration::from_secs(600), |s| {
                s.status == SessionStatus::Idle && s.listening
            })
            .await
        );
        assert_eq!(rt.synthesizer.spoken().last().map(String::as_str), Some("Tạm biệt!"));
        assert!(rt.snapshot().transcript.is_empty());
    }

    #[tokio::test]
    async fn test_end_conversation() {
        let rt = TestRuntime::builder().build();
        wake(&rt, SessionStatus::AwaitingTopic).await;

        rt.send(Event::EndConversation).await;
        assert!(
            rt.wait_for(|s| s.status == SessionStatus::Idle && s.transcript.is_empty())
                .await
        );
        assert_eq!(
            rt.device.commands(),
            vec![DeviceCommand::On, DeviceCommand::Off]
        );
    }

    /// Integration test: clips wait for the UI's report before listening again
    #[tokio::test(start_paused = true)]
    async fn test_clip_playback_waits_for_report() {
        let mut rt = TestRuntime::builder().clips().build();
        assert!(rt.ready().await);
        rt.say("xin chào robot").await;

        let Some(SseEvent::Play { playback, src, .. }) = rt
            .expect_event(|e| matches!(e, SseEvent::Play { .. }))
            .await
        else {
            panic!("expected play event");
        };
        assert_eq!(src, "/audio/clip-1.mp3");
        assert!(!rt.snapshot().listening);

        // speech during playback never reaches the state machine
        assert_eq!(rt.say("xin chào robot").await, None);

        let start = tokio::time::Instant::now();
        rt.send(Event::PlaybackFinished { playback }).await;
        assert!(rt.wait_for(|s| s.listening).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreported_clip_times_out() {
        let rt = TestRuntime::builder().clips().build();
        assert!(rt.ready().await);
        rt.say("xin chào robot").await;
        assert!(rt.wait_for(|s| s.speaking).await);

        let start = tokio::time::Instant::now();
        assert!(
            rt.wait_for_within(Duration::from_secs(300), |s| s.listening)
                .await
        );
        assert!(start.elapsed() >= Duration::from_secs(59));
    }
}
