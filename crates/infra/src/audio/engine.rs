//! Real-time speech mixer
//!
//! This module provides the SpeechMixer, which owns the output line and a
//! single long-lived loop thread. Every chunk period the loop pulls one chunk
//! from the dialogue stream and from each floating stream, averages them and
//! writes the result to the line.
//!
//! The event side only ever touches the shared [`MixBus`] through the
//! ingestion methods below. The lock is held for one mutation or one mix
//! iteration; synthesis and decoding happen before a stream gets here.

use crate::audio::cadence::Cadence;
use crossbeam::channel::bounded;
use parley_core::domain::audio::{AudioError, AudioFormat, OutputLine, Result, SourceClass, CHUNK_BYTES};
use parley_core::domain::mixer::MixBus;
use parley_core::domain::stream::PcmSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Mixer lifecycle: `start` opens the line and enters Running, `stop` leaves it
pub struct SpeechMixer {
    bus: Arc<Mutex<MixBus>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SpeechMixer {
    /// Start the mixer loop.
    ///
    /// `open_line` runs on the loop thread, since device handles are not
    /// always `Send`. If it fails the mixer never enters Running and the
    /// error is returned here.
    pub fn start<F>(open_line: F, max_floating: usize) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn OutputLine>> + Send + 'static,
    {
        let bus = Arc::new(Mutex::new(MixBus::with_max_floating(max_floating)));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let loop_bus = Arc::clone(&bus);
        let loop_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("parley-mixer".to_string())
            .spawn(move || {
                let line = match open_line() {
                    Ok(line) => {
                        let _ = ready_tx.send(Ok(()));
                        line
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_loop(line, &loop_bus, &loop_running);
            })
            .map_err(|e| AudioError::OsError(format!("Failed to spawn mixer thread: {}", e)))?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("Mixer thread exited during start".to_string())));

        if let Err(e) = opened {
            running.store(false, Ordering::Release);
            if handle.join().is_err() {
                error!("Mixer thread panicked during start");
            }
            error!(error = %e, "Failed to open output line");
            return Err(e);
        }

        info!(
            format = %AudioFormat,
            max_floating,
            "Speech mixer running"
        );

        Ok(Self {
            bus,
            running,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Replace the dialogue stream, closing the one playing.
    ///
    /// Returns `false` (and closes `stream`) once the mixer is stopped.
    pub fn set_dialogue_stream(&self, stream: Box<dyn PcmSource>) -> bool {
        let accepted = lock(&self.bus).set_dialogue(stream);
        if accepted {
            debug!("Dialogue stream installed");
        }
        accepted
    }

    /// Replace the dialogue stream only if `current` still holds.
    ///
    /// `current` is evaluated under the bus lock, so a concurrent
    /// `stop_dialogue_stream` either runs first and is seen, or runs after
    /// and silences the installed stream. A stale stream is closed.
    pub fn set_dialogue_stream_if(&self, mut stream: Box<dyn PcmSource>, current: impl FnOnce() -> bool) -> bool {
        let mut bus = lock(&self.bus);
        if !current() {
            drop(bus);
            stream.close();
            debug!("Superseded dialogue stream dropped");
            return false;
        }
        let accepted = bus.set_dialogue(stream);
        if accepted {
            debug!("Dialogue stream installed");
        }
        accepted
    }

    /// Add a stream that plays alongside everything else
    pub fn add_floating_stream(&self, stream: Box<dyn PcmSource>) -> bool {
        let accepted = lock(&self.bus).add_floating(stream);
        if accepted {
            debug!("Floating stream added");
        }
        accepted
    }

    /// Route a decoded stream by its source class
    pub fn ingest(&self, class: SourceClass, stream: Box<dyn PcmSource>) -> bool {
        if class.is_dialogue() {
            self.set_dialogue_stream(stream)
        } else {
            self.add_floating_stream(stream)
        }
    }

    /// Silence the dialogue stream, if any
    pub fn stop_dialogue_stream(&self) -> bool {
        let stopped = lock(&self.bus).stop_dialogue();
        if stopped {
            debug!("Dialogue stream stopped");
        }
        stopped
    }

    /// Stop the loop, drain and close the line. Safe to call more than once.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("Stopping speech mixer");
        if let Some(handle) = lock(&self.thread).take() {
            if handle.join().is_err() {
                error!("Mixer thread panicked");
            }
        }

        lock(&self.bus).close_all();
        debug!("Speech mixer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Nothing is playing
    pub fn is_idle(&self) -> bool {
        lock(&self.bus).is_idle()
    }

    /// Number of floating streams still playing
    pub fn floating_count(&self) -> usize {
        lock(&self.bus).floating_count()
    }

    pub fn has_dialogue(&self) -> bool {
        lock(&self.bus).has_dialogue()
    }
}

impl Drop for SpeechMixer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut line: Box<dyn OutputLine>, bus: &Mutex<MixBus>, running: &AtomicBool) {
    let mut output = [0u8; CHUNK_BYTES];
    let mut cadence = Cadence::new(AudioFormat.chunk_duration());
    let mut write_failures: u64 = 0;

    debug!(period = ?cadence.period(), "Mixer loop started");

    while running.load(Ordering::Acquire) {
        let report = lock(bus).mix_chunk(&mut output);
        if report.released > 0 {
            trace!(released = report.released, active = report.active, "Streams finished");
        }

        if let Err(e) = line.write(&output) {
            write_failures += 1;
            // First failure and then every ~10 s, the loop keeps its cadence
            if write_failures == 1 || write_failures % 300 == 0 {
                warn!(error = %e, failures = write_failures, "Output write failed");
            }
        }

        cadence.wait();
    }

    line.drain();
    line.close();
    debug!(reanchors = cadence.reanchors(), "Mixer loop exited");
}
