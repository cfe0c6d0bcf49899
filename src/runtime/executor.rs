//! Session runtime executor

use super::traits::{DeviceLink, ToolHandler};
use super::{SessionError, SessionSnapshot, SseEvent};

use crate::assistant::{AssistantBackend, EventStream, ThreadHandle, ToolOutput};
use crate::state_machine::{transition, Effect, Event, Notice, SessionContext, SessionState};
use crate::transcript::{Transcript, Turn};
use crate::voice::{
    RecognitionInput, Recognizer, Rendering, SpeechInputAdapter, SpeechOutputAdapter, Synthesizer,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Finalize recognizer input and forward the utterance to a session
pub async fn submit_speech<R: Recognizer>(
    input: &SpeechInputAdapter<R>,
    event_tx: &mpsc::Sender<Event>,
    raw: RecognitionInput,
) -> Result<Option<String>, SessionError> {
    let Some(text) = input.accept(raw).await? else {
        return Ok(None);
    };
    event_tx
        .send(Event::Utterance { text: text.clone() })
        .await
        .map_err(|_| SessionError::Closed)?;
    Ok(Some(text))
}

/// Generic session runtime that can work with any backend, voice and tool implementations
pub struct SessionRuntime<B, R, S, T>
where
    B: AssistantBackend + 'static,
    R: Recognizer + 'static,
    S: Synthesizer + 'static,
    T: ToolHandler + 'static,
{
    context: SessionContext,
    state: SessionState,
    transcript: Transcript,
    thread: ThreadHandle,
    backend: Arc<B>,
    input: Arc<SpeechInputAdapter<R>>,
    output: Arc<SpeechOutputAdapter<S>>,
    tools: Arc<T>,
    device: Option<Arc<dyn DeviceLink>>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// The single armed inactivity timer
    timer: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<B, R, S, T> SessionRuntime<B, R, S, T>
where
    B: AssistantBackend + 'static,
    R: Recognizer + 'static,
    S: Synthesizer + 'static,
    T: ToolHandler + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        thread: ThreadHandle,
        backend: B,
        input: Arc<SpeechInputAdapter<R>>,
        output: SpeechOutputAdapter<S>,
        tools: T,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        Self {
            context,
            state: SessionState::default(),
            transcript: Transcript::new(),
            thread,
            backend: Arc::new(backend),
            input,
            output: Arc::new(output),
            tools: Arc::new(tools),
            device: None,
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
            timer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the hardware link signalled on wake and reset
    pub fn with_device(mut self, device: Option<Arc<dyn DeviceLink>>) -> Self {
        self.device = device;
        self
    }

    /// Stop the runtime when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, thread = %self.thread, "Starting session runtime");

        // Open the microphone to listen for the wake phrase
        self.process_event(Event::ResumeListening).await;

        // Process events in a loop - no recursion
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                Some(event) = self.event_rx.recv() => {
                    self.process_event(event).await;
                }
                else => break,
            }
        }

        self.disarm_timer();
        self.input.stop().await;
        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) {
        // Events generated synchronously by effects are handled before the next queued one
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) => {
                    // Transition errors are user-facing (e.g. "busy")
                    tracing::debug!(error = %e, "Event rejected");
                    self.broadcast(SseEvent::Error {
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            self.state = result.new_state;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        self.publish_snapshot();
    }

    fn broadcast(&self, event: SseEvent) {
        // No subscribers just means no UI is attached right now
        let _ = self.broadcast_tx.send(event);
    }

    /// Refresh the shared snapshot, announcing status changes
    fn publish_snapshot(&self) {
        let snapshot =
            SessionSnapshot::capture(&self.context.session_id, &self.state, &self.transcript);
        if !snapshot.same_status(&self.snapshot_tx.borrow()) {
            self.broadcast(snapshot.status_event());
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    fn turn_event(&self, index: usize, appended: bool) -> Option<SseEvent> {
        let turn = self.transcript.turns().get(index)?.clone();
        Some(if appended {
            SseEvent::TurnAppended { index, turn }
        } else {
            SseEvent::TurnUpdated { index, turn }
        })
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Send an event back into this session after `delay`
    fn schedule(&self, delay: Duration, event: Event) -> JoinHandle<()> {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = event_tx.send(event).await;
        })
    }

    /// Execute an effect and optionally return a generated event
    #[allow(clippy::too_many_lines)] // Effect handling is inherently long
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            // ============================================================
            // Transcript
            // ============================================================
            Effect::AppendTurn { role, text } => {
                let index = self.transcript.push(Turn::new(role, text));
                if let Some(event) = self.turn_event(index, true) {
                    self.broadcast(event);
                }
                None
            }

            Effect::AppendToLastTurn { role, text } => {
                match self.transcript.append_to_last(role, &text) {
                    Some(index) => {
                        if let Some(event) = self.turn_event(index, false) {
                            self.broadcast(event);
                        }
                    }
                    None => tracing::debug!(?role, "No turn to extend, dropping delta"),
                }
                None
            }

            Effect::RewriteLastTurn { role, replacements } => {
                if let Some(index) = self.transcript.rewrite_last(role, &replacements) {
                    if let Some(event) = self.turn_event(index, false) {
                        self.broadcast(event);
                    }
                }
                None
            }

            Effect::ClearTranscript => {
                self.transcript.clear();
                self.broadcast(SseEvent::TranscriptCleared);
                None
            }

            // ============================================================
            // Microphone
            // ============================================================
            Effect::StartListening => match self.input.start().await {
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to start recognizer");
Some(Event::RecognizerFailed)
                }
            },

            Effect::StopListening => {
                self.input.stop().await;
                None
            }

            Effect::RestartRecognizer => match self.input.restart().await {
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to restart recognizer");
Some(Event::RecognizerFailed)
                }
            },

            Effect::ScheduleRecognizerRetry { delay } => {
                self.schedule(delay, Event::RecognizerRetry);
                None
            }

            // ============================================================
            // Playback
            // ============================================================
            Effect::Speak { playback, text } => {
                self.output.begin(&*self.input).await;

                let output = self.output.clone();
                let event_tx = self.event_tx.clone();
                let broadcast_tx = self.broadcast_tx.clone();
                let watchdog = self.context.playback_timeout;

                tokio::spawn(async move {
                    tracing::debug!(playback, chars = text.len(), "Rendering speech");
                    match output.render(&text).await {
                        Ok(Rendering::Completed) => {}
                        Ok(Rendering::Clip { src }) => {
                            let _ = broadcast_tx.send(SseEvent::Play { playback, src, text });
                            // The UI reports completion; this covers a UI that never does
                            tokio::time::sleep(watchdog).await;
                            tracing::debug!(playback, ?watchdog, "Playback watchdog elapsed");
                        }
                        Err(e) => {
                            tracing::warn!(playback, error = %e, "Speech synthesis failed");
                        }
                    }
                    let _ = event_tx
                        .send(Event::PlaybackFinished { playback })
                        .await;
                });
                None
            }

            Effect::FinishPlayback { playback } => {
                tracing::debug!(playback, "Playback finished");
                self.output.finish();
                None
            }

            Effect::ScheduleResume { delay } => {
                self.schedule(delay, Event::ResumeListening);
                None
            }

            // ============================================================
            // Inactivity timer
            // ============================================================
            Effect::ArmTimer {
                generation,
                timeout,
            } => {
                self.disarm_timer();
                self.timer = Some(self.schedule(timeout, Event::InactivityTimeout { generation }));
                None
            }

            Effect::DisarmTimer => {
                self.disarm_timer();
                None
            }

            // ============================================================
            // Backend
            // ============================================================
            Effect::PostQuestion { run, text, topic } => {
                let backend = self.backend.clone();
                let thread = self.thread.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    tracing::info!(run, topic = ?topic, "Posting question");
                    match backend.post_message(&thread, &text, topic).await {
                        Ok(stream) => forward_stream(run, 0, stream, &event_tx).await,
                        Err(e) => {
                            tracing::warn!(run, error = %e, "Failed to post question");
                            let _ = event_tx
                                .send(Event::BackendFailed {
                                    run,
                                    message: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
                None
            }

            Effect::ExecuteToolCalls {
                run,
                backend_run_id,
                calls,
            } => {
                let tools = self.tools.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    let mut outputs = Vec::with_capacity(calls.len());
                    for call in calls {
                        tracing::info!(run, tool = %call.name, id = %call.id, "Executing tool");
                        let output = tools.call(&call.name, &call.arguments).await;
                        outputs.push(ToolOutput {
                            tool_call_id: call.id,
                            output,
                        });
                    }
                    let _ = event_tx
                        .send(Event::ToolOutputsReady {
                            run,
                            backend_run_id,
                            outputs,
                        })
                        .await;
                });
                None
            }

            Effect::SubmitToolOutputs {
                run,
                segment,
                backend_run_id,
                outputs,
            } => {
                let backend = self.backend.clone();
                let thread = self.thread.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    match backend
                        .submit_tool_outputs(&thread, &backend_run_id, &outputs)
                        .await
                    {
                        Ok(stream) => forward_stream(run, segment, stream, &event_tx).await,
                        Err(e) => {
                            tracing::warn!(run, error = %e, "Failed to submit tool outputs");
                            let _ = event_tx
                                .send(Event::BackendFailed {
                                    run,
                                    message: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
                None
            }

            // ============================================================
            // Device and notices
            // ============================================================
            Effect::SignalDevice { command } => {
                if let Some(device) = &self.device {
                    if let Err(e) = device.signal(command) {
                        tracing::warn!(command = command.as_str(), error = %e, "Device signal failed");
                    }
                }
                None
            }

            Effect::Notify(Notice::Busy { text }) => {
                tracing::debug!(text = %text, "Dropping utterance while a question is answered");
                self.broadcast(SseEvent::Busy { text });
                None
            }

            Effect::Notify(Notice::Error { message }) => {
                tracing::warn!(session_id = %self.context.session_id, error = %message, "Session error");
                self.broadcast(SseEvent::Error { message });
                None
            }
        }
    }
}

/// Forward a run's events in arrival order, then report the stream closed
async fn forward_stream(run: u64, segment: u32, mut stream: EventStream, event_tx: &mpsc::Sender<Event>) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if event_tx.send(Event::Stream { run, event }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(run, error = %e, "Response stream failed");
                let _ = event_tx
                    .send(Event::BackendFailed {
                        run,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }
    let _ = event_tx.send(Event::StreamClosed { run, segment }).await;
}
