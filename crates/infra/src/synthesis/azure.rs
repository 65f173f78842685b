//! Azure Speech REST client
//!
//! Synthesis posts an SSML document and asks for raw 16 kHz/16-bit/mono PCM,
//! which is the mixer's native format. Voice listing returns the catalogue
//! for the configured region.

use async_trait::async_trait;
use parley_core::domain::config::SynthesisConfig;
use parley_core::domain::synthesis::{
    Result, SpeechAudio, SpeechSynthesizer, SynthesisError, SynthesisRequest, VoiceInfo,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!("parley/", env!("CARGO_PKG_VERSION"));
const OUTPUT_FORMAT: &str = "raw-16khz-16bit-mono-pcm";
const SUBSCRIPTION_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Speech synthesis through the Azure Cognitive Services REST API
pub struct AzureSynthesizer {
    http_client: reqwest::Client,
    api_key: String,
    region: String,
    base_url: Option<String>,
}

impl AzureSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| SynthesisError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: config.api_key.trim().to_string(),
            region: config.region.trim().to_string(),
            base_url: None,
        })
    }

    /// Send requests to `base_url` instead of the regional endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, service: &str, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{}{}", base, path),
            None => format!("https://{}.{}.speech.microsoft.com{}", self.region, service, path),
        }
    }

    fn check_credentials(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(SynthesisError::Credentials("no subscription key configured".to_string()));
        }
        if self.region.is_empty() && self.base_url.is_none() {
            return Err(SynthesisError::Credentials("no service region configured".to_string()));
        }
        Ok(())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SynthesisError::Credentials(format!("service answered {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        let reason = body.trim();
        Err(SynthesisError::Rejected(if reason.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, reason)
        }))
    }
}

fn network(e: reqwest::Error) -> SynthesisError {
    SynthesisError::Network(e.to_string())
}

#[async_trait]
impl SpeechSynthesizer for AzureSynthesizer {
    #[instrument(skip(self, request), fields(voice = %request.voice))]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechAudio> {
        self.check_credentials()?;

        let url = self.endpoint("tts", "/cognitiveservices/v1");
        debug!(chars = request.text.len(), "Requesting synthesis");

        let response = self
            .http_client
            .post(&url)
            .header(SUBSCRIPTION_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(request.to_ssml())
            .send()
            .await
            .map_err(network)?;

        let response = Self::check_status(response).await?;
        let audio = response.bytes().await.map_err(network)?;
        if audio.is_empty() {
            return Err(SynthesisError::Empty);
        }

        debug!(bytes = audio.len(), "Synthesis complete");
        Ok(Box::new(Cursor::new(audio)))
    }

    #[instrument(skip(self))]
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        self.check_credentials()?;

        let url = self.endpoint("tts", "/cognitiveservices/voices/list");
        let response = self
            .http_client
            .get(&url)
            .header(SUBSCRIPTION_HEADER, &self.api_key)
            .send()
            .await
            .map_err(network)?;

        let response = Self::check_status(response).await?;
        let voices: Vec<VoiceInfo> = response
            .json()
            .await
            .map_err(|e| SynthesisError::Rejected(format!("unexpected voice list: {}", e)))?;

        debug!(count = voices.len(), "Listed voices");
        Ok(voices)
    }
}
