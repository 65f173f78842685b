//! Mix bus: the dialogue slot, the floating set and the chunk mixing kernel
//!
//! The bus holds every live speech stream and produces one chunk of mixed
//! output per call to [`MixBus::mix_chunk`]. It has no notion of time or of
//! the device; the mixer loop in `infra` owns the bus behind a mutex and
//! paces the calls.

use crate::domain::audio::{CHUNK_BYTES, SAMPLES_PER_CHUNK};
use crate::domain::stream::PcmSource;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use tracing::{debug, trace, warn};

/// Default cap on concurrently playing floating streams
pub const DEFAULT_MAX_FLOATING: usize = 16;

/// What happened during one mix iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MixReport {
    /// Streams that contributed samples to this chunk
    pub active: usize,
    /// Streams released because they ran out or failed
    pub released: usize,
}

enum ReadOutcome {
    Chunk,
    FinalChunk,
    Exhausted,
    Failed(io::Error),
}

/// Pull one chunk from `source` and add its samples into `acc`.
///
/// A short read is zero-padded so the tail of the last chunk still plays.
fn pull_chunk(
    source: &mut dyn PcmSource,
    scratch: &mut [u8; CHUNK_BYTES],
    acc: &mut [i32; SAMPLES_PER_CHUNK],
) -> ReadOutcome {
    match source.read_chunk(scratch) {
        Ok(0) => ReadOutcome::Exhausted,
        Ok(n) => {
            let n = n.min(CHUNK_BYTES);
            scratch[n..].fill(0);
            for (slot, pair) in acc.iter_mut().zip(scratch.chunks_exact(2)) {
                *slot += i32::from(i16::from_le_bytes([pair[0], pair[1]]));
            }
            if n < CHUNK_BYTES {
                ReadOutcome::FinalChunk
            } else {
                ReadOutcome::Chunk
            }
        }
        Err(e) => ReadOutcome::Failed(e),
    }
}

/// Live speech streams and the averaging mixer over them
pub struct MixBus {
    dialogue: Option<Box<dyn PcmSource>>,
    floating: VecDeque<Box<dyn PcmSource>>,
    max_floating: usize,
    scratch: [u8; CHUNK_BYTES],
    accumulator: [i32; SAMPLES_PER_CHUNK],
    closed: bool,
}

impl MixBus {
    pub fn new() -> Self {
        Self::with_max_floating(DEFAULT_MAX_FLOATING)
    }

    /// Create a bus holding at most `max_floating` floating streams (0 = unbounded)
    pub fn with_max_floating(max_floating: usize) -> Self {
        Self {
            dialogue: None,
            floating: VecDeque::new(),
            max_floating,
            scratch: [0; CHUNK_BYTES],
            accumulator: [0; SAMPLES_PER_CHUNK],
            closed: false,
        }
    }

    /// Install a new dialogue line, cutting off the one currently playing.
    ///
    /// Returns `false` (and closes the stream) when the bus is closed.
    pub fn set_dialogue(&mut self, mut stream: Box<dyn PcmSource>) -> bool {
        if self.closed {
            stream.close();
            return false;
        }

        if let Some(mut previous) = self.dialogue.replace(stream) {
            previous.close();
            debug!("Dialogue stream preempted");
        } else {
            debug!("Dialogue stream set");
        }
        true
    }

    /// Add a floating stream, evicting the oldest one when the set is full.
    ///
    /// Returns `false` (and closes the stream) when the bus is closed.
    pub fn add_floating(&mut self, mut stream: Box<dyn PcmSource>) -> bool {
        if self.closed {
            stream.close();
            return false;
        }

        if self.max_floating > 0 && self.floating.len() >= self.max_floating {
            if let Some(mut oldest) = self.floating.pop_front() {
                oldest.close();
                warn!(
                    max = self.max_floating,
                    "Floating stream limit reached, dropping the oldest stream"
                );
            }
        }

        self.floating.push_back(stream);
        debug!(total = self.floating.len(), "Floating stream added");
        true
    }

    /// Cut the current dialogue line short. Returns whether one was playing.
    pub fn stop_dialogue(&mut self) -> bool {
        match self.dialogue.take() {
            Some(mut stream) => {
                stream.close();
                debug!("Dialogue stream stopped");
                true
            }
            None => false,
        }
    }

    /// Mix one chunk from every live stream into `out` as little-endian i16.
    pub fn mix_chunk(&mut self, out: &mut [u8; CHUNK_BYTES]) -> MixReport {
        self.accumulator.fill(0);
        let mut report = MixReport::default();

        if let Some(mut stream) = self.dialogue.take() {
            match pull_chunk(stream.as_mut(), &mut self.scratch, &mut self.accumulator) {
                ReadOutcome::Chunk => {
                    report.active += 1;
                    self.dialogue = Some(stream);
                }
                ReadOutcome::FinalChunk => {
                    report.active += 1;
                    report.released += 1;
                    stream.close();
                    trace!("Dialogue stream finished");
                }
                ReadOutcome::Exhausted => {
                    report.released += 1;
                    stream.close();
                    trace!("Dialogue stream finished");
                }
                ReadOutcome::Failed(e) => {
                    report.released += 1;
                    stream.close();
                    warn!(error = %e, "Error reading dialogue stream, dropping it");
                }
            }
        }

        self.floating.retain_mut(|stream| {
            match pull_chunk(stream.as_mut(), &mut self.scratch, &mut self.accumulator) {
                ReadOutcome::Chunk => {
                    report.active += 1;
                    true
                }
                ReadOutcome::FinalChunk => {
                    report.active += 1;
                    report.released += 1;
                    stream.close();
                    false
                }
                ReadOutcome::Exhausted => {
                    report.released += 1;
                    stream.close();
                    false
                }
                ReadOutcome::Failed(e) => {
                    report.released += 1;
                    stream.close();
                    warn!(error = %e, "Error reading floating stream, dropping it");
                    false
                }
            }
        });

        if report.active > 1 {
            let divisor = report.active as i32;
            for sample in self.accumulator.iter_mut() {
                *sample /= divisor;
            }
        }

        // Saturate instead of wrapping so overloaded mixes clip rather than crackle
        for (pair, &sample) in out.chunks_exact_mut(2).zip(self.accumulator.iter()) {
            let narrowed = sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            pair.copy_from_slice(&narrowed.to_le_bytes());
        }

        report
    }

    /// Release every stream and refuse new ones
    pub fn close_all(&mut self) {
        self.closed = true;
        self.stop_dialogue();
        for mut stream in self.floating.drain(..) {
            stream.close();
        }
    }

    pub fn has_dialogue(&self) -> bool {
        self.dialogue.is_some()
    }

    pub fn floating_count(&self) -> usize {
        self.floating.len()
    }

    /// True when nothing is left to play
    pub fn is_idle(&self) -> bool {
        self.dialogue.is_none() && self.floating.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MixBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MixBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixBus")
            .field("dialogue", &self.dialogue.is_some())
            .field("floating", &self.floating.len())
            .field("max_floating", &self.max_floating)
            .field("closed", &self.closed)
            .finish()
    }
}
