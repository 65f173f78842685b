//! Fakes shared by the playback tests

use crate::audio::engine::SpeechMixer;
use crate::playback::notify::Notifier;
use async_trait::async_trait;
use parley_core::domain::audio::{OutputLine, Result as AudioResult};
use parley_core::domain::synthesis::{
    Result, SpeechAudio, SpeechSynthesizer, SynthesisError, SynthesisRequest, VoiceInfo,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Discards everything written to it
pub struct NullLine;

impl OutputLine for NullLine {
    fn write(&mut self, chunk: &[u8]) -> AudioResult<usize> {
        Ok(chunk.len())
    }

    fn drain(&mut self) {}

    fn close(&mut self) {}
}

pub fn mixer() -> SpeechMixer {
    SpeechMixer::start(|| Ok(Box::new(NullLine) as Box<dyn OutputLine>), 16).unwrap()
}

enum Script {
    Audio(Vec<u8>),
    Fail,
}

/// Synthesizer returning a fixed answer and counting requests
pub struct ScriptedSynthesizer {
    script: Script,
    delays: Vec<(String, Duration)>,
    calls: AtomicUsize,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl ScriptedSynthesizer {
    /// Constant PCM tone of `samples` samples
    pub fn tone(samples: usize) -> Self {
        let pcm = (0..samples).flat_map(|_| 1000i16.to_le_bytes()).collect();
        Self::raw(pcm)
    }

    pub fn raw(bytes: Vec<u8>) -> Self {
        Self {
            script: Script::Audio(bytes),
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: Script::Fail,
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests for `text` only after `delay`
    pub fn delaying(mut self, text: &str, delay: Duration) -> Self {
        self.delays.push((text.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some((_, delay)) = self.delays.iter().find(|(text, _)| *text == request.text) {
            tokio::time::sleep(*delay).await;
        }
        match &self.script {
            Script::Audio(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Script::Fail => Err(SynthesisError::Network("connection refused".to_string())),
        }
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
