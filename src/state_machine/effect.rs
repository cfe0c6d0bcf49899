//! Effects produced by state transitions

use crate::assistant::{ToolCallRequest, ToolOutput};
use crate::link::DeviceCommand;
use crate::state_machine::state::Topic;
use crate::transcript::Role;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // Transcript
    AppendTurn {
        role: Role,
        text: String,
    },
    /// Extend the last turn if it has this role
    AppendToLastTurn {
        role: Role,
        text: String,
    },
    RewriteLastTurn {
        role: Role,
        replacements: Vec<(String, String)>,
    },
    ClearTranscript,

    // Microphone
    StartListening,
    StopListening,
    RestartRecognizer,
    ScheduleRecognizerRetry {
        delay: Duration,
    },

    // Playback
    Speak {
        playback: u64,
        text: String,
    },
    /// Playback settled; clear the output adapter's in-progress flag
    FinishPlayback {
        playback: u64,
    },
    ScheduleResume {
        delay: Duration,
    },

    // Inactivity timer. Arming replaces any previous timer.
    ArmTimer {
        generation: u64,
        timeout: Duration,
    },
    DisarmTimer,

    // Backend
    PostQuestion {
        run: u64,
        text: String,
        topic: Option<Topic>,
    },
    ExecuteToolCalls {
        run: u64,
        backend_run_id: String,
        calls: Vec<ToolCallRequest>,
    },
    SubmitToolOutputs {
        run: u64,
        segment: u32,
        backend_run_id: String,
        outputs: Vec<ToolOutput>,
    },

    SignalDevice {
        command: DeviceCommand,
    },

    /// Tell connected clients something that is not a state change
    Notify(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An utterance was dropped because a question is still being answered
    Busy { text: String },
    Error { message: String },
}

impl Effect {
    pub fn append_user(text: impl Into<String>) -> Self {
        Effect::AppendTurn {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn append_assistant(text: impl Into<String>) -> Self {
        Effect::AppendTurn {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Effect::Notify(Notice::Error {
            message: message.into(),
        })
    }
}
