//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::state::*;
use super::transition::*;
use super::*;
use crate::assistant::AssistantEvent;
use crate::transcript::Role;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new("test-session")
}

fn listening_in(phase: Phase) -> SessionState {
    let mut state = SessionState {
        phase,
        ..SessionState::default()
    };
    state.voice.listening = true;
    state
}

/// Drive a sequence of events, skipping rejected ones
fn run_events(mut state: SessionState, events: Vec<Event>) -> SessionState {
    let ctx = test_context();
    for event in events {
        if let Ok(result) = transition(&state, &ctx, event) {
            state = result.new_state;
        }
    }
    state
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_topic() -> impl Strategy<Value = Topic> {
    prop_oneof![
        Just(Topic::Subject),
        Just(Topic::Rules),
        Just(Topic::Schedule),
    ]
}

fn arb_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Idle),
        Just(Phase::AwaitingTopic),
        proptest::option::of(arb_topic()).prop_map(|topic| Phase::InTopic { topic }),
        Just(Phase::Cooldown),
    ]
}

/// Filler words that never contain a phrase the orchestrator reacts to
fn arb_filler() -> impl Strategy<Value = String> {
    "[a-z ]{0,12}"
}

fn arb_utterance_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("xin chào robot".to_string()),
        Just("Xin chào Robot, tôi là An".to_string()),
        Just("đổi chủ đề".to_string()),
        Just("nội quy".to_string()),
        Just("thời khóa biểu tuần này".to_string()),
        Just("nội dung môn học".to_string()),
        Just("   ".to_string()),
        "[a-z ?]{1,20}",
    ]
}

fn arb_assistant_event() -> impl Strategy<Value = AssistantEvent> {
    prop_oneof![
        Just(AssistantEvent::TextCreated),
        "[a-z ]{1,10}".prop_map(|value| AssistantEvent::TextDelta {
            value,
            annotations: vec![],
        }),
        "[a-z .]{0,10}".prop_map(|text| AssistantEvent::TextDone { text }),
        Just(AssistantEvent::RunCompleted),
        "[a-z]{1,8}".prop_map(|message| AssistantEvent::RunFailed { message }),
        Just(AssistantEvent::ActionRequired {
            run_id: "run_1".to_string(),
            tool_calls: vec![],
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        4 => arb_utterance_text().prop_map(|text| Event::Utterance { text }),
        1 => arb_utterance_text().prop_map(|text| Event::TypedMessage { text }),
        1 => Just(Event::RecognizerEnded),
        1 => Just(Event::ResumeListening),
        3 => (1u64..4, arb_assistant_event()).prop_map(|(run, event)| Event::Stream { run, event }),
        1 => (1u64..4, 0u32..3).prop_map(|(run, segment)| Event::StreamClosed { run, segment }),
        1 => (1u64..4).prop_map(|run| Event::ToolOutputsReady {
            run,
            backend_run_id: "run_1".to_string(),
            outputs: vec![],
        }),
        1 => (1u64..4).prop_map(|run| Event::BackendFailed {
            run,
            message: "boom".to_string(),
        }),
        3 => (1u64..6).prop_map(|playback| Event::PlaybackFinished { playback }),
        1 => (0u64..6).prop_map(|generation| Event::InactivityTimeout { generation }),
        1 => any::<bool>().prop_map(|present| Event::PresenceChanged { present }),
        1 => Just(Event::EndConversation),
    ]
}

fn arb_reachable_state() -> impl Strategy<Value = SessionState> {
    (arb_phase(), proptest::collection::vec(arb_event(), 0..15))
        .prop_map(|(phase, events)| run_events(listening_in(phase), events))
}

/// Woken and done greeting (timer armed), then the last armed state seen
/// while applying arbitrary events
fn arb_armed_state() -> impl Strategy<Value = SessionState> {
    proptest::collection::vec(arb_event(), 0..15).prop_map(|events| {
        let ctx = test_context();
        let mut state = run_events(
            listening_in(Phase::Idle),
            vec![
                Event::Utterance {
                    text: "xin chào robot".to_string(),
                },
                Event::PlaybackFinished { playback: 1 },
            ],
        );
        let mut armed = state.clone();
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
                if state.timer.armed {
                    armed = state.clone();
                }
            }
        }
        armed
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Listening and speaking are never both true
    #[test]
    fn prop_never_listens_while_speaking(
        phase in arb_phase(),
        events in proptest::collection::vec(arb_event(), 0..40)
    ) {
        let ctx = test_context();
        let mut state = listening_in(phase);

        for event in events {
            let Ok(result) = transition(&state, &ctx, event) else {
                continue;
            };
            state = result.new_state;
            prop_assert!(
                !(state.voice.listening && state.voice.speaking),
                "listening while speaking: {:?}",
                state
            );
            if result.effects.iter().any(|e| matches!(e, Effect::Speak { .. })) {
                prop_assert!(state.voice.speaking);
            }
            if result.effects.contains(&Effect::StartListening) {
                prop_assert!(!state.voice.speaking);
            }
            prop_assert_eq!(state.voice.speaking, state.speech.current.is_some());
        }
    }

    // Playback ids only grow
    #[test]
    fn prop_playback_ids_increase(
        phase in arb_phase(),
        events in proptest::collection::vec(arb_event(), 0..40)
    ) {
        let ctx = test_context();
        let mut state = listening_in(phase);
        let mut last = 0;

        for event in events {
            let Ok(result) = transition(&state, &ctx, event) else {
                continue;
            };
            for effect in &result.effects {
                if let Effect::Speak { playback, .. } = effect {
                    prop_assert!(*playback > last);
                    last = *playback;
                }
            }
            state = result.new_state;
        }
    }

    // The wake phrase anywhere in an utterance appends exactly two turns
    #[test]
    fn prop_wake_appends_user_and_greeting(before in arb_filler(), after in arb_filler()) {
        let text = format!("{before}xin chào robot{after}");
        let result = transition(
            &listening_in(Phase::Idle),
            &test_context(),
            Event::Utterance { text },
        ).unwrap();

        let appended: Vec<Role> = result.effects.iter().filter_map(|e| match e {
            Effect::AppendTurn { role, .. } => Some(*role),
            _ => None,
        }).collect();
        prop_assert_eq!(appended, vec![Role::User, Role::Assistant]);
        prop_assert_eq!(result.new_state.phase, Phase::AwaitingTopic);
    }

    // Any utterance containing a topic keyword selects that topic
    #[test]
    fn prop_keyword_selects_topic(
        topic in arb_topic(),
        before in arb_filler(),
        after in arb_filler()
    ) {
        let text = format!("{before}{}{after}", topic.keyword());
        let result = transition(
            &listening_in(Phase::AwaitingTopic),
            &test_context(),
            Event::Utterance { text },
        ).unwrap();

        prop_assert_eq!(result.new_state.phase, Phase::InTopic { topic: Some(topic) });
        let asked = result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::AppendTurn { role: Role::User, .. }));
        prop_assert!(!asked, "topic choice was appended as a question");
    }

    // Only the exact change-topic phrase leaves the topic; anything else is a question
    #[test]
    fn prop_change_topic_requires_exact_match(
        topic in arb_topic(),
        before in "[a-z]{1,6} "
    ) {
        let ctx = test_context();
        let state = listening_in(Phase::InTopic { topic: Some(topic) });

        let exact = transition(&state, &ctx, Event::Utterance {
            text: "  Đổi Chủ Đề ".to_string(),
        }).unwrap();
        prop_assert_eq!(exact.new_state.phase, Phase::AwaitingTopic);

        let embedded = transition(&state, &ctx, Event::Utterance {
            text: format!("{before}đổi chủ đề"),
        }).unwrap();
        prop_assert_eq!(embedded.new_state.phase, Phase::InTopic { topic: Some(topic) });
        let forwarded_topic = embedded.effects.iter().find_map(|e| match e {
            Effect::PostQuestion { topic, .. } => Some(*topic),
            _ => None,
        });
        prop_assert_eq!(forwarded_topic, Some(Some(topic)));
    }

    // Events for runs, playbacks or timers that are not current change nothing
    #[test]
    fn prop_stale_events_ignored(state in arb_reachable_state(), event in arb_assistant_event()) {
        let ctx = test_context();
        let stale_run = state.next_run + 1;
        let stale_playback = state.speech.next_id + 1;

        let stale_events = vec![
            Event::Stream { run: stale_run, event },
            Event::StreamClosed { run: stale_run, segment: 0 },
            Event::BackendFailed { run: stale_run, message: "late".to_string() },
            Event::ToolOutputsReady {
                run: stale_run,
                backend_run_id: "run_1".to_string(),
                outputs: vec![],
            },
            Event::PlaybackFinished { playback: stale_playback },
            Event::InactivityTimeout { generation: state.timer.generation + 1 },
        ];

        for event in stale_events {
            let result = transition(&state, &ctx, event).unwrap();
            prop_assert_eq!(&result.new_state, &state);
            prop_assert!(result.effects.is_empty());
        }
    }

    // A firing timer always clears the transcript, unlocks and returns to Idle
    #[test]
    fn prop_timeout_resets(state in arb_armed_state()) {
        prop_assert!(state.timer.armed);
        let result = transition(
            &state,
            &test_context(),
            Event::InactivityTimeout { generation: state.timer.generation },
        ).unwrap();

        prop_assert_eq!(result.new_state.phase, Phase::Idle);
        prop_assert!(!result.new_state.input_locked());
        prop_assert!(!result.new_state.timer.armed);
        prop_assert!(result.effects.contains(&Effect::ClearTranscript));
    }

    // Typed messages are refused exactly when input is locked
    #[test]
    fn prop_typed_message_respects_lock(state in arb_reachable_state(), text in "[a-z]{1,10}") {
        let result = transition(&state, &test_context(), Event::TypedMessage { text });
        if state.input_locked() {
            prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        } else {
            let result = result.unwrap();
            prop_assert!(result.new_state.input_locked());
            prop_assert_eq!(result.new_state.next_run, state.next_run + 1);
        }
    }
}
