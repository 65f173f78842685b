//! Infrastructure for parley
//!
//! - `audio`: output device, stream decoding and the real-time mixer loop
//! - `synthesis`: network speech synthesis backends
//! - `playback`: request gating, dispatch and event narration

pub mod audio;
pub mod playback;
pub mod synthesis;
