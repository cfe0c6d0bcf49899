//! Speech input adapter and recognizers

use super::{CaptureMode, OpenAiSpeech, SpeechError, VoiceGate};
use crate::runtime::SseEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Raw material a recognizer turns into an utterance
#[derive(Debug, Clone)]
pub enum RecognitionInput {
    /// Already finalized by the browser's engine
    Transcript(String),
    /// Recorded audio segment (WAV)
    Audio(Vec<u8>),
}

/// Continuous speech recognition capability
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Open the microphone
    async fn start(&self) -> Result<(), SpeechError>;

    async fn stop(&self);

    /// Finalize one piece of input into text. `None` means nothing was said.
    async fn finalize(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError>;
}

#[async_trait]
impl<T: Recognizer + ?Sized> Recognizer for Arc<T> {
    async fn start(&self) -> Result<(), SpeechError> {
        (**self).start().await
    }

    async fn stop(&self) {
        (**self).stop().await;
    }

    async fn finalize(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError> {
        (**self).finalize(input).await
    }
}

fn announce(notifier: &broadcast::Sender<SseEvent>, active: bool, capture: CaptureMode, locale: &str) {
    // No subscribers just means no UI is attached yet
    let _ = notifier.send(SseEvent::Microphone {
        active,
        capture,
        locale: locale.to_string(),
    });
}

/// Recognition done by the browser's native engine. Starting and stopping
/// tells the UI to open or close it; finalized transcripts come back over HTTP.
pub struct BrowserRecognizer {
    notifier: broadcast::Sender<SseEvent>,
    locale: String,
}

impl BrowserRecognizer {
    pub fn new(notifier: broadcast::Sender<SseEvent>, locale: impl Into<String>) -> Self {
        Self {
            notifier,
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl Recognizer for BrowserRecognizer {
    async fn start(&self) -> Result<(), SpeechError> {
        announce(&self.notifier, true, CaptureMode::Speech, &self.locale);
        Ok(())
    }

    async fn stop(&self) {
        announce(&self.notifier, false, CaptureMode::Speech, &self.locale);
    }

    async fn finalize(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError> {
        match input {
            RecognitionInput::Transcript(text) => Ok(Some(text)),
            RecognitionInput::Audio(_) => Err(SpeechError::Unsupported("audio upload")),
        }
    }
}

/// Recognition through the remote transcription API. The UI records audio
/// segments while the microphone is open and uploads them.
pub struct WhisperRecognizer {
    notifier: broadcast::Sender<SseEvent>,
    speech: Arc<OpenAiSpeech>,
    locale: String,
}

impl WhisperRecognizer {
    pub fn new(
        notifier: broadcast::Sender<SseEvent>,
        speech: Arc<OpenAiSpeech>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            speech,
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn start(&self) -> Result<(), SpeechError> {
        announce(&self.notifier, true, CaptureMode::Audio, &self.locale);
        Ok(())
    }

    async fn stop(&self) {
        announce(&self.notifier, false, CaptureMode::Audio, &self.locale);
    }

    async fn finalize(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError> {
        match input {
            RecognitionInput::Transcript(text) => Ok(Some(text)),
            RecognitionInput::Audio(audio) => self.speech.transcribe(audio).await.map(Some),
        }
    }
}

/// Which recognizer each new session gets
#[derive(Clone)]
pub enum RecognizerKind {
    Browser {
        locale: String,
    },
    Whisper {
        speech: Arc<OpenAiSpeech>,
        locale: String,
    },
}

impl RecognizerKind {
    pub fn build(&self, notifier: broadcast::Sender<SseEvent>) -> Arc<dyn Recognizer> {
        match self {
            RecognizerKind::Browser { locale } => {
                Arc::new(BrowserRecognizer::new(notifier, locale.clone()))
            }
            RecognizerKind::Whisper { speech, locale } => Arc::new(WhisperRecognizer::new(
                notifier,
                speech.clone(),
                locale.clone(),
            )),
        }
    }
}

#[derive(Debug)]
struct InputFlags {
    active: bool,
    /// Stopped on purpose (or never started); unexpected ends do not restart
    stopped: bool,
}

/// Wraps a [`Recognizer`] with idempotent start/stop and the speaking gate
pub struct SpeechInputAdapter<R> {
    recognizer: R,
    gate: Arc<VoiceGate>,
    flags: Mutex<InputFlags>,
}

impl<R: Recognizer> SpeechInputAdapter<R> {
    pub fn new(recognizer: R, gate: Arc<VoiceGate>) -> Self {
        Self {
            recognizer,
            gate,
            flags: Mutex::new(InputFlags {
                active: false,
                stopped: true,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_listening()
    }

    /// Open the microphone. No-op while active or while output is speaking.
    /// Returns whether the recognizer was actually started.
    pub async fn start(&self) -> Result<bool, SpeechError> {
        let mut flags = self.flags.lock().await;
        if flags.active || self.gate.is_speaking() {
            return Ok(false);
        }
        // A failed start counts as an unexpected end, so restart may retry it
        flags.stopped = false;
        self.recognizer.start().await?;
        flags.active = true;
        self.gate.set_listening(true);
        Ok(true)
    }

    /// Close the microphone. No-op when already stopped.
    pub async fn stop(&self) -> bool {
        let mut flags = self.flags.lock().await;
        flags.stopped = true;
        if !flags.active {
            return false;
        }
        self.recognizer.stop().await;
        flags.active = false;
        self.gate.set_listening(false);
        true
    }

    /// The engine ended or failed on its own. Start it again unless it was
    /// stopped on purpose or output is speaking.
    pub async fn restart(&self) -> Result<bool, SpeechError> {
        let mut flags = self.flags.lock().await;
        if flags.stopped || self.gate.is_speaking() {
            return Ok(false);
        }
        flags.active = false;
        self.gate.set_listening(false);
        self.recognizer.start().await?;
        flags.active = true;
        self.gate.set_listening(true);
        Ok(true)
    }

    /// Finalize input into an utterance. Input arriving while the microphone
    /// is closed is discarded so playback is never transcribed.
    pub async fn accept(&self, input: RecognitionInput) -> Result<Option<String>, SpeechError> {
        if !self.is_active() {
            tracing::debug!("Discarding recognition input while microphone is closed");
            return Ok(None);
        }
        let text = self.recognizer.finalize(input).await?;
        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}
