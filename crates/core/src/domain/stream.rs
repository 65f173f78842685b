//! PCM stream handles consumed by the mixer
//!
//! A handle is owned by exactly one holder at a time. Once it has been
//! handed to the mixer nothing else reads from it.

use crate::domain::audio::{AudioError, AudioFormat, Result};
use std::io::{self, Cursor, Read};
use std::time::Duration;

/// Sequential source of fixed-format PCM bytes
pub trait PcmSource: Send {
    /// Fill `buf` with the next bytes of the stream.
    ///
    /// The buffer is filled completely unless the stream runs out, so a
    /// short read is the final chunk and `Ok(0)` means end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the underlying resources. Reads after close return `Ok(0)`.
    fn close(&mut self);
}

/// Fully buffered PCM stream in the fixed format
#[derive(Debug)]
pub struct PcmStream {
    data: Cursor<Vec<u8>>,
    frames: usize,
    closed: bool,
}

impl PcmStream {
    /// Wrap raw 16 kHz / 16-bit / mono bytes
    pub fn from_pcm(bytes: Vec<u8>) -> Result<Self> {
        let frame_size = AudioFormat.frame_size();
        if bytes.len() % frame_size != 0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "{} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame_size
            )));
        }

        Ok(Self {
            frames: bytes.len() / frame_size,
            data: Cursor::new(bytes),
            closed: false,
        })
    }

    /// Encode samples as little-endian PCM
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>();
        Self {
            frames: samples.len(),
            data: Cursor::new(bytes),
            closed: false,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        AudioFormat.frames_to_duration(self.frames)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PcmSource for PcmStream {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            match self.data.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.data = Cursor::new(Vec::new());
        }
    }
}
