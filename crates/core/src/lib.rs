//! Core domain for parley, the in-game speech narration pipeline
//!
//! Everything in this crate is platform-agnostic: device access, the mixer
//! thread and the network synthesis client live in `parley-infra`.

pub mod domain;
