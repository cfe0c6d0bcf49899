//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same new
//! state and effects. All I/O happens in the runtime executing the effects.

use super::effect::Notice;
use super::state::{PendingRun, Phase, Phrases, SessionContext, SessionState, Topic};
use super::{Effect, Event};
use crate::assistant::{file_path, AssistantEvent, ToolCallKind};
use crate::link::DeviceCommand;
use crate::transcript::Role;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A question is still being answered, try again when it finishes")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
}

/// Pure transition function
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        // ============================================================
        // Input
        // ============================================================
        Event::Utterance { text } => {
            let trimmed = text.trim();
            // Never transcribe our own voice
            if trimmed.is_empty() || !state.voice.listening {
                return Ok(TransitionResult::new(next));
            }
            handle_utterance(&mut next, context, &mut effects, trimmed);
            if wants_timer(&next) {
                arm_timer(&mut next, context, &mut effects);
            }
        }

        Event::TypedMessage { text } => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            if state.input_locked() {
                return Err(TransitionError::Busy);
            }
            let topic = next.phase.topic();
            ask(&mut next, &mut effects, trimmed, topic);
            if wants_timer(&next) {
                arm_timer(&mut next, context, &mut effects);
            }
        }

        Event::RecognizerEnded | Event::RecognizerRetry => {
            if state.voice.listening && !state.voice.speaking {
                effects.push(Effect::RestartRecognizer);
            }
        }

        Event::RecognizerFailed => {
            if state.voice.listening && !state.voice.speaking {
                effects.push(Effect::ScheduleRecognizerRetry {
                    delay: context.recognizer_retry_delay,
                });
            }
        }

        Event::ResumeListening => {
            if !state.voice.speaking && !state.voice.listening {
                next.voice.listening = true;
                effects.push(Effect::StartListening);
            }
        }

        // ============================================================
        // Backend
        // ============================================================
        Event::Stream { run, event } => {
            if current_run(state) == Some(run) {
                consume_stream_event(&mut next, &mut effects, run, event);
            }
        }

        Event::ToolOutputsReady {
            run,
            backend_run_id,
            outputs,
        } => {
            if let Some(pending) = next.pending_run.as_mut() {
                if pending.run == run && pending.awaiting_tools {
                    pending.awaiting_tools = false;
                    pending.segment += 1;
                    effects.push(Effect::SubmitToolOutputs {
                        run,
                        segment: pending.segment,
                        backend_run_id,
                        outputs,
                    });
                }
            }
        }

        Event::StreamClosed { run, segment } => {
            let premature = state.pending_run.is_some_and(|pending| {
                pending.run == run && pending.segment == segment && !pending.awaiting_tools
            });
            if premature {
                next.pending_run = None;
                effects.push(Effect::error(
                    "The response stream ended before the answer was complete",
                ));
            }
        }

        Event::BackendFailed { run, message } => {
            if current_run(state) == Some(run) {
                next.pending_run = None;
                effects.push(Effect::error(message));
            }
        }

        // ============================================================
        // Playback
        // ============================================================
        Event::PlaybackFinished { playback } => {
            if state.speech.current != Some(playback) {
                return Ok(TransitionResult::new(next));
            }
            next.speech.current = None;
            effects.push(Effect::FinishPlayback { playback });

            if let Some(queued) = next.speech.queued.pop_front() {
                start_playback(&mut next, &mut effects, queued);
            } else {
                next.voice.speaking = false;
                effects.push(Effect::ScheduleResume {
                    delay: context.resume_delay,
                });
                if next.phase == Phase::Cooldown {
                    next.phase = Phase::Idle;
                }
                if wants_timer(&next) {
                    arm_timer(&mut next, context, &mut effects);
                }
            }
        }

        // ============================================================
        // Session lifecycle
        // ============================================================
        Event::InactivityTimeout { generation } => {
            if !state.timer.armed || state.timer.generation != generation {
                return Ok(TransitionResult::new(next));
            }
            next.timer.armed = false;
            let was_chatting = state.phase.is_chatting();
            reset(&mut next, &mut effects, was_chatting);

            match (&context.phrases.farewell, was_chatting) {
                (Some(farewell), true) => {
                    next.phase = Phase::Cooldown;
                    speak(&mut next, &mut effects, farewell.clone());
                }
                _ => next.phase = Phase::Idle,
            }
        }

        Event::EndConversation => {
            if state.timer.armed {
                next.timer.armed = false;
                effects.push(Effect::DisarmTimer);
            }
            let was_chatting = state.phase.is_chatting();
            reset(&mut next, &mut effects, was_chatting);
            next.phase = Phase::Idle;
        }

        Event::PresenceChanged { present } => {
            next.present = present;
            if present != state.present && wants_timer(&next) {
                arm_timer(&mut next, context, &mut effects);
            }
        }
    }

    Ok(TransitionResult::new(next).with_effects(effects))
}

// ============================================================================
// Helpers
// ============================================================================

fn current_run(state: &SessionState) -> Option<u64> {
    state.pending_run.map(|pending| pending.run)
}

/// Decide what a non-empty utterance means in the current phase
fn handle_utterance(
    state: &mut SessionState,
    context: &SessionContext,
    effects: &mut Vec<Effect>,
    text: &str,
) {
    let phrases = &context.phrases;
    let lowered = text.to_lowercase();

    match state.phase {
        Phase::Idle => {
            if !lowered.contains(&phrases.wake) {
                return;
            }
            effects.push(Effect::append_user(text));
            effects.push(Effect::SignalDevice {
                command: DeviceCommand::On,
            });
            if context.require_topic {
                state.phase = Phase::AwaitingTopic;
                say(state, effects, phrases.greeting.clone());
            } else {
                state.phase = Phase::InTopic { topic: None };
                say(state, effects, phrases.open_greeting.clone());
            }
        }

        Phase::AwaitingTopic => match Topic::detect(&lowered) {
            Some(topic) => {
                state.phase = Phase::InTopic { topic: Some(topic) };
                say(state, effects, Phrases::confirmation(topic));
            }
            None => say(state, effects, phrases.clarification.clone()),
        },

        Phase::InTopic { topic } => {
            if lowered == phrases.change_topic {
                state.phase = Phase::AwaitingTopic;
                say(state, effects, phrases.topic_prompt.clone());
            } else if state.input_locked() {
                effects.push(Effect::Notify(Notice::Busy {
                    text: text.to_string(),
                }));
            } else {
                ask(state, effects, text, topic);
            }
        }

        Phase::Cooldown => {}
    }
}

/// Record a user question and lock input until its run finishes
fn ask(state: &mut SessionState, effects: &mut Vec<Effect>, text: &str, topic: Option<Topic>) {
    let run = state.next_run;
    state.next_run += 1;
    state.pending_run = Some(PendingRun {
        run,
        segment: 0,
        awaiting_tools: false,
    });
    state.asked = true;
    effects.push(Effect::append_user(text));
    effects.push(Effect::PostQuestion {
        run,
        text: text.to_string(),
        topic,
    });
}

fn consume_stream_event(
    state: &mut SessionState,
    effects: &mut Vec<Effect>,
    run: u64,
    event: AssistantEvent,
) {
    match event {
        AssistantEvent::TextCreated => effects.push(Effect::append_assistant("")),
        AssistantEvent::TextDelta { value, annotations } => {
            effects.push(Effect::AppendToLastTurn {
                role: Role::Assistant,
                text: value,
            });
            if !annotations.is_empty() {
                effects.push(Effect::RewriteLastTurn {
                    role: Role::Assistant,
                    replacements: annotations
                        .iter()
                        .map(|annotation| (annotation.text.clone(), annotation.serving_path()))
                        .collect(),
                });
            }
        }
        AssistantEvent::TextDone { text } => speak(state, effects, text),
        AssistantEvent::ImageFile { file_id } => {
            let path = file_path(&file_id);
            effects.push(Effect::AppendToLastTurn {
                role: Role::Assistant,
                text: format!("\n![{file_id}]({path})\n"),
            });
        }
        AssistantEvent::ToolCallCreated {
            kind: ToolCallKind::CodeInterpreter,
            ..
        } => effects.push(Effect::AppendTurn {
            role: Role::ToolOutput,
            text: String::new(),
        }),
        AssistantEvent::ToolCallDelta {
            kind: ToolCallKind::CodeInterpreter,
            input,
        } => effects.push(Effect::AppendToLastTurn {
            role: Role::ToolOutput,
            text: input,
        }),
        AssistantEvent::ToolCallCreated { .. }
        | AssistantEvent::ToolCallDelta { .. }
        | AssistantEvent::Unknown { .. } => {}
        AssistantEvent::ActionRequired { run_id, tool_calls } => {
            if let Some(pending) = state.pending_run.as_mut() {
                pending.awaiting_tools = true;
            }
            effects.push(Effect::ExecuteToolCalls {
                run,
                backend_run_id: run_id,
                calls: tool_calls,
            });
        }
        AssistantEvent::RunCompleted => state.pending_run = None,
        AssistantEvent::RunFailed { message } => {
            state.pending_run = None;
            effects.push(Effect::error(message));
        }
    }
}

/// Append an assistant turn and speak it
fn say(state: &mut SessionState, effects: &mut Vec<Effect>, text: String) {
    effects.push(Effect::append_assistant(text.clone()));
    speak(state, effects, text);
}

/// Speak now, or queue behind the playback in progress
fn speak(state: &mut SessionState, effects: &mut Vec<Effect>, text: String) {
    if text.trim().is_empty() {
        return;
    }
    if state.speech.current.is_some() {
        state.speech.queued.push_back(text);
    } else {
        start_playback(state, effects, text);
    }
}

/// Input always stops before playback starts
fn start_playback(state: &mut SessionState, effects: &mut Vec<Effect>, text: String) {
    if state.voice.listening {
        state.voice.listening = false;
        effects.push(Effect::StopListening);
    }
    state.voice.speaking = true;
    if state.timer.armed {
        state.timer.armed = false;
        effects.push(Effect::DisarmTimer);
    }
    state.speech.next_id += 1;
    let playback = state.speech.next_id;
    state.speech.current = Some(playback);
    effects.push(Effect::Speak { playback, text });
}

/// Quiet, and there is a conversation or asked question to time out
fn wants_timer(state: &SessionState) -> bool {
    !state.voice.speaking && (state.phase.is_chatting() || state.asked)
}

/// A fresh generation replaces whatever timer was armed before
fn arm_timer(state: &mut SessionState, context: &SessionContext, effects: &mut Vec<Effect>) {
    state.timer.generation += 1;
    state.timer.armed = true;
    let timeout = if state.present {
        context.inactivity_timeout
    } else {
        context.absence_timeout
    };
    effects.push(Effect::ArmTimer {
        generation: state.timer.generation,
        timeout,
    });
}

/// Back to a blank conversation. The playback in progress is left to finish.
fn reset(state: &mut SessionState, effects: &mut Vec<Effect>, was_chatting: bool) {
    state.pending_run = None;
    state.asked = false;
    state.speech.queued.clear();
    effects.push(Effect::ClearTranscript);
    if was_chatting {
        effects.push(Effect::SignalDevice {
            command: DeviceCommand::Off,
        });
    }
}
