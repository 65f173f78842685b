//! Turning synthesis output into mixer-ready PCM
//!
//! Backends are asked for raw 16 kHz/16-bit/mono PCM. Some answer with a
//! RIFF/WAV container instead; that is accepted when its format matches.

use crate::audio::engine::SpeechMixer;
use parley_core::domain::audio::{SourceClass, BYTES_PER_SAMPLE, SAMPLE_RATE};
use parley_core::domain::stream::PcmStream;
use std::io::{self, Cursor, Read};
use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No audio data")]
    Empty,

    #[error("Malformed PCM: {0} bytes is not a whole number of frames")]
    MalformedFrames(usize),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn decode_wav(bytes: Vec<u8>) -> Result<PcmStream> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.channels != 1
        || spec.sample_rate != SAMPLE_RATE
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
    {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} Hz, {} channels, {} bit {:?}",
            spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(PcmStream::from_samples(&samples))
}

/// Drain `source` to completion and wrap it as a PCM stream.
pub fn decode(mut source: impl Read) -> Result<PcmStream> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;

    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let stream = if is_wav(&bytes) {
        decode_wav(bytes)?
    } else {
        if bytes.len() % BYTES_PER_SAMPLE != 0 {
            return Err(DecodeError::MalformedFrames(bytes.len()));
        }
        let len = bytes.len();
        PcmStream::from_pcm(bytes).map_err(|_| DecodeError::MalformedFrames(len))?
    };

    debug!(frames = stream.frame_count(), duration = ?stream.duration(), "Decoded speech");
    Ok(stream)
}

/// Hand a decoded stream to the mixer under its source class.
///
/// Returns `false` when the mixer has stopped and the stream was dropped.
pub fn route(class: SourceClass, stream: PcmStream, mixer: &SpeechMixer) -> bool {
    let accepted = mixer.ingest(class, Box::new(stream));
    if !accepted {
        warn!(%class, "Mixer is stopped, dropping decoded speech");
    }
    accepted
}
