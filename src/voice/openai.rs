//! `OpenAI` speech endpoints: synthesis and transcription

use super::SpeechError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Text to raw audio bytes
#[async_trait]
pub trait SpeechApi: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

pub struct OpenAiSpeech {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    speed: f32,
    transcription_model: String,
    /// ISO-639-1 language passed to transcription
    language: String,
}

impl OpenAiSpeech {
    pub fn new(api_key: String, model: String, voice: String, speed: f32, locale: &str) -> Self {
        let language = locale.split('-').next().unwrap_or("vi").to_string();
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            voice,
            speed,
            transcription_model: "whisper-1".to_string(),
            language,
        }
    }

    /// Transcribe a WAV segment
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, SpeechError> {
        tracing::debug!(audio_bytes = audio.len(), "Starting transcription");

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SpeechError::Recognition(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Recognition(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Recognition(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let result: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Recognition(format!("invalid response: {e}")))?;
        tracing::info!(transcript = %result.text, "Transcription complete");
        Ok(result.text)
    }
}

#[async_trait]
impl SpeechApi for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Synthesis(format!(
                "TTS API error {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("failed to read audio: {e}")))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl<T: SpeechApi + ?Sized> SpeechApi for std::sync::Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        (**self).synthesize(text).await
    }
}
