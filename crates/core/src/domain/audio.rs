//! Audio format, source tagging and the output device boundary
//!
//! The pipeline speaks exactly one PCM format. Everything that reaches the
//! mixer has already been converted to it, and the output line only ever
//! receives whole chunks of it. Implementations for real devices live in
//! the `infra` crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for audio device
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Samples per second of every stream in the pipeline
pub const SAMPLE_RATE: u32 = 16_000;

/// Signed 16-bit little-endian samples
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes consumed from each stream per mix iteration
pub const CHUNK_BYTES: usize = 1024;

/// Samples consumed from each stream per mix iteration
pub const SAMPLES_PER_CHUNK: usize = CHUNK_BYTES / BYTES_PER_SAMPLE;

/// The fixed PCM format: 16 kHz, 16-bit signed little-endian, mono
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat;

impl AudioFormat {
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub const fn channels(&self) -> u16 {
        1
    }

    pub const fn bits_per_sample(&self) -> u16 {
        (BYTES_PER_SAMPLE * 8) as u16
    }

    /// Bytes per frame (one sample per channel)
    pub const fn frame_size(&self) -> usize {
        BYTES_PER_SAMPLE
    }

    /// Wall-clock duration of one chunk (512 / 16000 s = 32 ms)
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_micros(SAMPLES_PER_CHUNK as u64 * 1_000_000 / SAMPLE_RATE as u64)
    }

    /// Playback duration of `frames` frames
    pub fn frames_to_duration(&self, frames: usize) -> Duration {
        Duration::from_micros(frames as u64 * 1_000_000 / SAMPLE_RATE as u64)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PCM_SIGNED {} Hz, {} bit, mono, little-endian",
            self.sample_rate(),
            self.bits_per_sample()
        )
    }
}

/// Where a piece of speech came from, which decides how the mixer holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceClass {
    /// The single interruptible line of conversation
    Dialogue,
    /// Overhead and examine text, superposed freely
    Floating,
    /// Preview playback from the settings surface
    Test,
}

impl SourceClass {
    /// Only dialogue owns the single slot; everything else floats.
    pub fn is_dialogue(&self) -> bool {
        matches!(self, SourceClass::Dialogue)
    }
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceClass::Dialogue => "dialogue",
            SourceClass::Floating => "floating",
            SourceClass::Test => "test",
        };
        f.write_str(name)
    }
}

/// Identity of the speaking entity, used to key duplicate suppression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    None,
    Entity(i32),
}

impl From<Option<i32>> for SourceId {
    fn from(id: Option<i32>) -> Self {
        id.map_or(SourceId::None, SourceId::Entity)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::None => f.write_str("none"),
            SourceId::Entity(id) => write!(f, "{}", id),
        }
    }
}

/// Sequential sink for mixed chunks
///
/// A line is opened once when the mixer starts and closed once when it
/// stops. It is used from the mixer thread only.
pub trait OutputLine {
    /// Write one chunk of fixed-format PCM, blocking while the device is full
    fn write(&mut self, chunk: &[u8]) -> Result<usize>;

    /// Block until everything written so far has been played
    fn drain(&mut self);

    /// Stop playback and release the device
    fn close(&mut self);
}
