//! Playback orchestration
//!
//! `play` is called from the event side and never blocks on the network:
//! it cleans the text, applies the cooldown gate and queues a synthesis job.
//! The job renders the speech, decodes it and hands it to the mixer. A failed
//! job notifies the user once and is not retried.
//!
//! Dialogue jobs carry the dialogue generation they were queued under. Every
//! dialogue `play` and every `stop_dialogue` starts a new generation, and a
//! job only installs its stream if its generation is still current, so a slow
//! older line never replaces a newer one or plays after a stop.

use crate::audio::decoder::{decode, route};
use crate::audio::engine::SpeechMixer;
use crate::playback::dispatch::{DispatchError, DispatchPool};
use crate::playback::notify::Notifier;
use parley_core::domain::attenuation::{attenuate, VolumeAdjustment};
use parley_core::domain::audio::SourceClass;
use parley_core::domain::config::PlaybackSettings;
use parley_core::domain::gate::{GateLimits, PlaybackGate};
use parley_core::domain::synthesis::{PlaybackRequest, SpeechSynthesizer, SynthesisRequest};
use parley_core::domain::text::sanitize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Outcome of a `play` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Synthesis job queued
    Queued,
    /// Same speaker said the same line inside the cooldown
    Suppressed,
    /// Nothing speakable left after cleaning
    Empty,
    /// Queue full or pipeline shutting down
    Rejected,
}

/// Collaborators and sizing for an orchestrator
pub struct PlaybackContext {
    pub mixer: Arc<SpeechMixer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: PlaybackSettings,
    pub gate_limits: GateLimits,
    pub worker_threads: usize,
    pub queue_capacity: usize,
    pub runtime: Handle,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Dialogue generation a job was queued under
struct DialogueTicket {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl DialogueTicket {
    fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.generation
    }
}

pub struct PlaybackOrchestrator {
    mixer: Arc<SpeechMixer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    notifier: Arc<dyn Notifier>,
    settings: RwLock<PlaybackSettings>,
    gate: Mutex<PlaybackGate>,
    pool: DispatchPool,
    dialogue_generation: Arc<AtomicU64>,
    epoch: Instant,
}

impl PlaybackOrchestrator {
    pub fn new(ctx: PlaybackContext) -> Self {
        let pool = DispatchPool::new(&ctx.runtime, ctx.worker_threads, ctx.queue_capacity);
        Self {
            mixer: ctx.mixer,
            synthesizer: ctx.synthesizer,
            notifier: ctx.notifier,
            settings: RwLock::new(ctx.settings),
            gate: Mutex::new(PlaybackGate::new(ctx.gate_limits)),
            pool,
            dialogue_generation: Arc::new(AtomicU64::new(0)),
            epoch: Instant::now(),
        }
    }

    /// Milliseconds on the orchestrator's monotonic clock
    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Queue a line for playback
    pub fn play(&self, request: PlaybackRequest) -> Dispatch {
        let text = sanitize(&request.text);
        if text.is_empty() {
            debug!(source = %request.source, "Nothing to speak after cleaning");
            return Dispatch::Empty;
        }

        let cooldown_ms = self.settings().cooldown_ms;
        let admitted = lock(&self.gate).admit(request.source, &text, cooldown_ms, self.now_ms());
        if !admitted {
            return Dispatch::Suppressed;
        }

        let ticket = request.class.is_dialogue().then(|| self.next_dialogue_generation());
        let synthesis = SynthesisRequest::new(text.clone(), &request.profile);
        let job = render(
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.notifier),
            Arc::clone(&self.mixer),
            request.class,
            ticket,
            synthesis,
        );

        let submitted = self.pool.submit(job);
        if submitted.is_err() {
            // A line that never ran must not hold the cooldown
            lock(&self.gate).revoke(request.source, &text);
        }

        match submitted {
            Ok(()) => {
                debug!(class = %request.class, source = %request.source, "Synthesis queued");
                Dispatch::Queued
            }
            Err(DispatchError::Saturated) => {
                warn!(source = %request.source, "Synthesis queue full, dropping line");
                Dispatch::Rejected
            }
            Err(DispatchError::ShutDown) => {
                debug!("Pipeline shutting down, dropping line");
                Dispatch::Rejected
            }
        }
    }

    /// Start a new dialogue generation, invalidating every older dialogue job
    fn next_dialogue_generation(&self) -> DialogueTicket {
        let generation = self.dialogue_generation.fetch_add(1, Ordering::AcqRel) + 1;
        DialogueTicket {
            counter: Arc::clone(&self.dialogue_generation),
            generation,
        }
    }

    /// Volume string for a speaker `distance` tiles away whose configured volume is `base`
    pub fn attenuated_volume(&self, base: &str, distance: u32) -> String {
        let adjustment: VolumeAdjustment = attenuate(distance, base, &self.settings().attenuation);
        adjustment.to_string()
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> PlaybackSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_settings(&self, settings: PlaybackSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        info!("Playback settings updated");
    }

    /// Silence the dialogue stream and drop dialogue jobs still in flight
    pub fn stop_dialogue(&self) -> bool {
        self.dialogue_generation.fetch_add(1, Ordering::AcqRel);
        self.mixer.stop_dialogue_stream()
    }

    pub fn mixer(&self) -> &Arc<SpeechMixer> {
        &self.mixer
    }

    /// Finish queued and running jobs; later `play` calls are rejected
    pub async fn quiesce(&self) {
        self.pool.shutdown().await;
    }

    /// Quiesce the pool, then stop the mixer
    pub async fn shutdown(&self) {
        self.quiesce().await;
        self.mixer.stop();
    }
}

async fn render(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    notifier: Arc<dyn Notifier>,
    mixer: Arc<SpeechMixer>,
    class: SourceClass,
    ticket: Option<DialogueTicket>,
    request: SynthesisRequest,
) {
    let audio = match synthesizer.synthesize(&request).await {
        Ok(audio) => audio,
        Err(e) => {
            error!(error = %e, voice = %request.voice, "Speech synthesis failed");
            notifier.notify(&format!("TTS failed: {}", e));
            return;
        }
    };

    // Draining the backend reader may block
    let decoded = tokio::task::spawn_blocking(move || decode(audio)).await;
    match decoded {
        Ok(Ok(stream)) => match ticket {
            Some(ticket) => {
                mixer.set_dialogue_stream_if(Box::new(stream), || ticket.is_current());
            }
            None => {
                route(class, stream, &mixer);
            }
        },
        Ok(Err(e)) => {
            error!(error = %e, "Failed to decode synthesized speech");
            notifier.notify(&format!("TTS failed: {}", e));
        }
        Err(e) => {
            error!(error = %e, "Decode task failed");
        }
    }
}
