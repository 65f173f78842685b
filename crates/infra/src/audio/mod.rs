//! Audio output and the real-time mixer
//!
//! Output goes through CPAL, which abstracts platform-specific APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cadence;
pub mod cpal_backend;
pub mod decoder;
pub mod engine;

pub use cadence::Cadence;
pub use cpal_backend::{list_output_devices, CpalOutputLine, OutputDeviceInfo};
pub use decoder::{decode, route, DecodeError};
pub use engine::SpeechMixer;
