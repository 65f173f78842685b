//! Fixtures for the pipeline integration tests

use async_trait::async_trait;
use parley_core::domain::audio::{OutputLine, Result as AudioResult, SAMPLES_PER_CHUNK};
use parley_core::domain::config::PlaybackSettings;
use parley_core::domain::gate::GateLimits;
use parley_core::domain::synthesis::{
    Result, SpeechAudio, SpeechSynthesizer, SynthesisError, SynthesisRequest, VoiceInfo,
};
use parley_core::domain::voice::{Gender, GenderClassifier};
use parley_infra::audio::SpeechMixer;
use parley_infra::playback::{Notifier, PlaybackContext, PlaybackOrchestrator};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

/// Output line keeping every chunk the mixer writes
#[derive(Clone, Default)]
pub struct CaptureLine {
    chunks: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl CaptureLine {
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    /// Decoded samples of every chunk written so far
    pub fn samples(&self) -> Vec<i16> {
        self.chunks()
            .iter()
            .flat_map(|chunk| {
                chunk
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl OutputLine for CaptureLine {
    fn write(&mut self, chunk: &[u8]) -> AudioResult<usize> {
        self.chunks.lock().unwrap().push(chunk.to_vec());
        Ok(chunk.len())
    }

    fn drain(&mut self) {}

    fn close(&mut self) {}
}

/// Mixer writing into a fresh capture line
pub fn capture_mixer() -> (SpeechMixer, CaptureLine) {
    let line = CaptureLine::default();
    let loop_line = line.clone();
    let mixer = SpeechMixer::start(move || Ok(Box::new(loop_line) as Box<dyn OutputLine>), 16).unwrap();
    (mixer, line)
}

/// Raw PCM for `samples` samples of one constant value
pub fn tone_pcm(value: i16, samples: usize) -> Vec<u8> {
    (0..samples).flat_map(|_| value.to_le_bytes()).collect()
}

/// Tone and latency for one scripted line
struct ScriptedLine {
    text: String,
    value: i16,
    delay: Duration,
}

/// Synthesizer answering with a constant tone, failing on selected texts
pub struct CountingSynthesizer {
    value: i16,
    samples: usize,
    fail_on: Vec<String>,
    lines: Vec<ScriptedLine>,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl CountingSynthesizer {
    pub fn new(value: i16, samples: usize) -> Self {
        Self {
            value,
            samples,
            fail_on: Vec::new(),
            lines: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request whose text is `text`
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    /// Answer `text` with a tone of `value` after `delay`
    pub fn line(mut self, text: &str, value: i16, delay: Duration) -> Self {
        self.lines.push(ScriptedLine {
            text: text.to_string(),
            value,
            delay,
        });
        self
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechSynthesizer for CountingSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SpeechAudio> {
        self.requests.lock().unwrap().push(request.clone());
        let mut value = self.value;
        if let Some(line) = self.lines.iter().find(|line| line.text == request.text) {
            tokio::time::sleep(line.delay).await;
            value = line.value;
        }
        if self.fail_on.contains(&request.text) {
            return Err(SynthesisError::Rejected("400 Bad Request".to_string()));
        }
        Ok(Box::new(Cursor::new(tone_pcm(value, self.samples))))
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

/// Classifier treating every NPC as male
pub struct AllMale;

impl GenderClassifier for AllMale {
    fn classify(&self, _id: i32, _name: &str) -> Gender {
        Gender::Male
    }
}

/// Orchestrator wired to a capture mixer
pub fn pipeline(
    synthesizer: Arc<CountingSynthesizer>,
    notifier: Arc<RecordingNotifier>,
    settings: PlaybackSettings,
) -> (Arc<PlaybackOrchestrator>, CaptureLine) {
    let (mixer, line) = capture_mixer();
    let orchestrator = PlaybackOrchestrator::new(PlaybackContext {
        mixer: Arc::new(mixer),
        synthesizer,
        notifier,
        settings,
        gate_limits: GateLimits::default(),
        worker_threads: 2,
        queue_capacity: 16,
        runtime: Handle::current(),
    });
    (Arc::new(orchestrator), line)
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Number of chunks a stream of `samples` samples occupies
pub fn chunks_for(samples: usize) -> usize {
    samples.div_ceil(SAMPLES_PER_CHUNK)
}
