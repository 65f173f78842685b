//! Speech synthesis boundary
//!
//! The backend is an external service: it takes text plus voice, pitch and
//! volume and returns an encoded byte stream. Only the contract lives here.

use crate::domain::audio::{SourceClass, SourceId};
use crate::domain::voice::VoiceProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Read;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SynthesisError>;

/// Why a synthesis request produced no audio
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Missing or invalid credentials: {0}")]
    Credentials(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Backend returned no audio")]
    Empty,
}

/// Sequential audio bytes returned by a backend
pub type SpeechAudio = Box<dyn Read + Send>;

/// A line to speak, as produced by the event side
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub text: String,
    pub profile: VoiceProfile,
    pub class: SourceClass,
    pub source: SourceId,
}

impl PlaybackRequest {
    pub fn new(
        text: impl Into<String>,
        profile: VoiceProfile,
        class: SourceClass,
        source: SourceId,
    ) -> Self {
        Self {
            text: text.into(),
            profile,
            class,
            source,
        }
    }
}

/// What the backend is asked to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub pitch: String,
    pub volume: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, profile: &VoiceProfile) -> Self {
        Self {
            text: text.into(),
            voice: profile.voice.clone(),
            pitch: profile.pitch.clone(),
            volume: profile.volume.clone(),
        }
    }

    /// SSML document for this request. Every value is XML-escaped.
    pub fn to_ssml(&self) -> String {
        format!(
            "<speak version=\"1.0\" xml:lang=\"en-US\"><voice name=\"{}\"><prosody pitch=\"{}\" volume=\"{}\">{}</prosody></voice></speak>",
            escape_xml(&self.voice),
            escape_xml(&self.pitch),
            escape_xml(&self.volume),
            escape_xml(&self.text),
        )
    }
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// A voice offered by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    #[serde(rename = "ShortName")]
    pub short_name: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Locale")]
    pub locale: String,
}

/// Text-to-speech backend
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render one request to an audio byte stream
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechAudio>;

    /// Voices the backend can render
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>>;
}
