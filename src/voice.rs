//! Speech input and output adapters
//!
//! Recognition and synthesis sit behind the [`Recognizer`] and [`Synthesizer`]
//! traits. The adapters wrapping them keep the flags the orchestrator relies
//! on: the microphone is never opened while something is being spoken.

mod cache;
mod input;
mod openai;
mod output;

pub use cache::AudioCache;
pub use input::{RecognitionInput, Recognizer, RecognizerKind, SpeechInputAdapter};
pub use openai::{OpenAiSpeech, SpeechApi};
pub use output::{LocalSynthesizer, RemoteSynthesizer, Rendering, SpeechOutputAdapter, Synthesizer};

use crate::link::LinkError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("recognition failed: {0}")]
    Recognition(String),
    #[error("{0} is not supported by this recognizer")]
    Unsupported(&'static str),
    #[error("no playback confirmation within {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// How the UI should capture speech while the microphone is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// The browser's recognition engine produces finalized transcripts
    Speech,
    /// The browser records audio segments and uploads them
    Audio,
}

/// Flags shared by the input and output adapters of one session
#[derive(Debug, Default)]
pub struct VoiceGate {
    listening: AtomicBool,
    speaking: AtomicBool,
}

impl VoiceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn set_listening(&self, value: bool) {
        self.listening.store(value, Ordering::SeqCst);
    }

    fn set_speaking(&self, value: bool) {
        self.speaking.store(value, Ordering::SeqCst);
    }
}
