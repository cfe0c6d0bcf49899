//! Speech output adapter and synthesizers

use super::{AudioCache, Recognizer, SpeechApi, SpeechError, SpeechInputAdapter, VoiceGate};
use crate::link::ConnectionManager;
use async_trait::async_trait;
use base64::Engine as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Message the local TTS engine sends when it finished speaking
const AUDIO_STOP: &str = "AUDIO_STOP";

/// Outcome of rendering text to sound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendering {
    /// Already played on the robot's own speaker
    Completed,
    /// Audio the UI has to play; it reports back when done
    Clip { src: String },
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn render(&self, text: &str) -> Result<Rendering, SpeechError>;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn render(&self, text: &str) -> Result<Rendering, SpeechError> {
        (**self).render(text).await
    }
}

fn data_url(audio: &[u8]) -> String {
    format!(
        "data:audio/mpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(audio)
    )
}

/// Synthesis through the remote speech API, optionally cached by content hash
pub struct RemoteSynthesizer<A> {
    api: A,
    cache: Option<AudioCache>,
}

impl<A: SpeechApi> RemoteSynthesizer<A> {
    pub fn new(api: A, cache: Option<AudioCache>) -> Self {
        Self { api, cache }
    }
}

#[async_trait]
impl<A: SpeechApi> Synthesizer for RemoteSynthesizer<A> {
    async fn render(&self, text: &str) -> Result<Rendering, SpeechError> {
        let Some(cache) = &self.cache else {
            let audio = self.api.synthesize(text).await?;
            return Ok(Rendering::Clip {
                src: data_url(&audio),
            });
        };

        if let Some(src) = cache.lookup(text).await {
            tracing::debug!(src = %src, "Reusing cached audio");
            return Ok(Rendering::Clip { src });
        }

        let audio = self.api.synthesize(text).await?;
        match cache.store(text, &audio).await {
            Ok(src) => Ok(Rendering::Clip { src }),
            Err(e) => {
                tracing::warn!(error = %e, "Audio cache write failed, playing uncached");
                Ok(Rendering::Clip {
                    src: data_url(&audio),
                })
            }
        }
    }
}

/// Synthesis on the local TTS engine reached over a WebSocket link
pub struct LocalSynthesizer {
    link: Arc<ConnectionManager>,
    timeout: Duration,
    /// Stops still owed by utterances we gave up waiting for
    late_stops: AtomicUsize,
}

impl LocalSynthesizer {
    pub fn new(link: Arc<ConnectionManager>, timeout: Duration) -> Self {
        Self {
            link,
            timeout,
            late_stops: AtomicUsize::new(0),
        }
    }

    /// Consume one owed stop, if any
    fn absorb_late_stop(&self) -> bool {
        self.late_stops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// The local engine reads markdown emphasis and headings aloud
fn strip_markdown(text: &str) -> String {
    text.replace(['*', '#'], "")
}

#[async_trait]
impl Synthesizer for LocalSynthesizer {
    async fn render(&self, text: &str) -> Result<Rendering, SpeechError> {
        let spoken = strip_markdown(text);
        if spoken.trim().is_empty() {
            return Ok(Rendering::Completed);
        }

        let mut inbound = self.link.subscribe();
        self.link.send(spoken)?;

        let finished = tokio::time::timeout(self.timeout, async {
            loop {
                match inbound.recv().await {
                    Ok(message) if message == AUDIO_STOP => {
                        if self.absorb_late_stop() {
                            tracing::debug!("Skipping stop of an abandoned utterance");
                            continue;
                        }
                        return true;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return false,
                }
            }
        })
        .await;

        match finished {
            Ok(true) => Ok(Rendering::Completed),
            Ok(false) => Err(SpeechError::Synthesis(format!(
                "link '{}' closed during playback",
                self.link.name()
            ))),
            Err(_) => {
                self.late_stops.fetch_add(1, Ordering::SeqCst);
                Err(SpeechError::Timeout(self.timeout))
            }
        }
    }
}

/// Wraps a [`Synthesizer`] with the in-progress flag and the speaking gate
pub struct SpeechOutputAdapter<S> {
    synthesizer: S,
    gate: Arc<VoiceGate>,
}

impl<S: Synthesizer> SpeechOutputAdapter<S> {
    pub fn new(synthesizer: S, gate: Arc<VoiceGate>) -> Self {
        Self { synthesizer, gate }
    }

    /// Close the microphone if open and mark playback as in progress
    pub async fn begin<R: Recognizer>(&self, input: &SpeechInputAdapter<R>) {
        if input.is_active() {
            input.stop().await;
        }
        self.gate.set_speaking(true);
    }

    pub async fn render(&self, text: &str) -> Result<Rendering, SpeechError> {
        self.synthesizer.render(text).await
    }

    /// Playback ended, successfully or not
    pub fn finish(&self) {
        self.gate.set_speaking(false);
    }
}
