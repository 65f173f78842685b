//! From playback requests to mixed speech
//!
//! - `narrator`: maps host game events to playback requests
//! - `orchestrator`: cooldown gate, synthesis dispatch, decoding, mixer hand-off
//! - `dispatch`: bounded pool for synthesis jobs
//! - `notify`: user-visible failure messages

pub mod dispatch;
pub mod narrator;
pub mod notify;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{DispatchError, DispatchPool};
pub use narrator::{NarrationEvent, Narrator, Speaker};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{Dispatch, PlaybackContext, PlaybackOrchestrator};
