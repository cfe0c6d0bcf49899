//! Process configuration from environment variables

use crate::assistant::AssistantIds;
use crate::state_machine::SessionContext;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How speech reaches the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerMode {
    /// The browser's own engine posts finalized transcripts
    Browser,
    /// The browser uploads audio; transcription happens remotely
    Whisper,
}

/// Where answers are rendered to sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesizerMode {
    /// Hosted text-to-speech, played back by the UI
    Remote,
    /// Engine on the robot reached over the TTS link
    Local,
}

/// Conversation behavior shared by every session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub require_topic: bool,
    pub inactivity_timeout: Duration,
    pub absence_timeout: Duration,
    pub resume_delay: Duration,
    pub playback_timeout: Duration,
    pub farewell: Option<String>,
}

impl SessionConfig {
    /// Session context template; the session id is filled in per session
    pub fn context(&self) -> SessionContext {
        let mut context = SessionContext::new("");
        context.require_topic = self.require_topic;
        context.inactivity_timeout = self.inactivity_timeout;
        context.absence_timeout = self.absence_timeout;
        context.resume_delay = self.resume_delay;
        context.playback_timeout = self.playback_timeout;
        context.phrases.farewell.clone_from(&self.farewell);
        context
    }
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub recognizer: RecognizerMode,
    pub synthesizer: SynthesizerMode,
    pub locale: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    /// Keep synthesized clips on disk, keyed by their text
    pub cache_audio: bool,
    /// Served under `/audio`
    pub audio_dir: PathBuf,
    pub local_tts_url: String,
    /// Longest wait for the local engine to finish one utterance
    pub local_tts_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub assistants: AssistantIds,
    /// `None` disables the device link
    pub device_url: Option<String>,
    pub link_reconnect_delay: Duration,
    /// Sessions without an event stream are closed after this long unseen
    pub session_idle_timeout: Duration,
    pub session: SessionConfig,
    pub voice: VoiceConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let assistants = AssistantIds {
            default: env.get("OPENAI_ASSISTANT_ID"),
            subject: env.get("OPENAI_SUBJECT_ASSISTANT_ID"),
            rules: env.get("OPENAI_RULES_ASSISTANT_ID"),
            schedule: env.get("OPENAI_SCHEDULE_ASSISTANT_ID"),
        };
        if assistants.default.is_none()
            && (assistants.subject.is_none()
                || assistants.rules.is_none()
                || assistants.schedule.is_none())
        {
            return Err(ConfigError::Missing("OPENAI_ASSISTANT_ID"));
        }

        let device_url = match env.get("ROBOT_CHAT_DEVICE_URL") {
            Some(url) if url.eq_ignore_ascii_case("off") => None,
            Some(url) => Some(url),
            None => Some("ws://raspberrypi.local:8765".to_string()),
        };

        let session = SessionConfig {
            require_topic: env.flag("ROBOT_CHAT_REQUIRE_TOPIC", true)?,
            inactivity_timeout: Duration::from_secs(env.parse("ROBOT_CHAT_INACTIVITY_SECS", 180)?),
            absence_timeout: Duration::from_secs(env.parse("ROBOT_CHAT_ABSENCE_SECS", 60)?),
            resume_delay: Duration::from_millis(env.parse("ROBOT_CHAT_RESUME_DELAY_MS", 500)?),
            playback_timeout: Duration::from_secs(env.parse("ROBOT_CHAT_PLAYBACK_TIMEOUT_SECS", 60)?),
            farewell: env.get("ROBOT_CHAT_FAREWELL"),
        };

        let recognizer = match env.get("ROBOT_CHAT_RECOGNIZER").as_deref() {
            None | Some("browser") => RecognizerMode::Browser,
            Some("whisper") => RecognizerMode::Whisper,
            Some(other) => return Err(invalid("ROBOT_CHAT_RECOGNIZER", other, "expected browser or whisper")),
        };
        let synthesizer = match env.get("ROBOT_CHAT_SYNTHESIZER").as_deref() {
            None | Some("remote") => SynthesizerMode::Remote,
            Some("local") => SynthesizerMode::Local,
            Some(other) => return Err(invalid("ROBOT_CHAT_SYNTHESIZER", other, "expected remote or local")),
        };

        let voice = VoiceConfig {
            recognizer,
            synthesizer,
            locale: env.get_or("ROBOT_CHAT_LOCALE", "vi-VN"),
            tts_model: env.get_or("OPENAI_TTS_MODEL", "tts-1"),
            tts_voice: env.get_or("OPENAI_TTS_VOICE", "alloy"),
            tts_speed: env.parse("OPENAI_TTS_SPEED", 1.0)?,
            cache_audio: env.flag("ROBOT_CHAT_CACHE_AUDIO", true)?,
            audio_dir: PathBuf::from(env.get_or("ROBOT_CHAT_AUDIO_DIR", "public/audio")),
            local_tts_url: env.get_or("ROBOT_CHAT_LOCAL_TTS_URL", "ws://127.0.0.1:6789"),
            local_tts_timeout: Duration::from_secs(env.parse("ROBOT_CHAT_LOCAL_TTS_TIMEOUT_SECS", 60)?),
        };

        Ok(Self {
            port: env.parse("PORT", 5000)?,
            openai_api_key: env.get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
            openai_base_url: env.get("OPENAI_BASE_URL"),
            assistants,
            device_url,
            link_reconnect_delay: Duration::from_secs(3),
            session_idle_timeout: Duration::from_secs(env.parse("ROBOT_CHAT_SESSION_IDLE_SECS", 600)?),
            session,
            voice,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &raw, e.to_string())),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(invalid(key, other, "expected a boolean")),
        }
    }
}
