//! Cooldown gate suppressing repeated lines from the same speaker
//!
//! Game clients re-fire the same overhead text and re-open the same dialogue
//! widget many times per second. The gate remembers when each
//! (speaker, text) pair was last admitted and drops repeats that arrive
//! inside the cooldown window. Dropping is the normal outcome for a repeat,
//! not an error.
//!
//! Memory stays bounded: stale entries are swept periodically and the map is
//! capped, evicting the least recently admitted key when full.

use crate::domain::audio::SourceId;
use crate::domain::text::normalize_line_breaks;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Bounds on the gate's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateLimits {
    /// Maximum number of remembered keys (0 = unbounded)
    pub max_entries: usize,
    /// Minimum time between sweeps of expired keys
    pub sweep_interval_ms: u64,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            max_entries: 4096,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Time-stamped map of recently admitted lines
#[derive(Debug, Default)]
pub struct PlaybackGate {
    last_played: HashMap<String, u64>,
    limits: GateLimits,
    last_sweep_ms: u64,
}

impl PlaybackGate {
    pub fn new(limits: GateLimits) -> Self {
        Self {
            last_played: HashMap::new(),
            limits,
            last_sweep_ms: 0,
        }
    }

    /// Key for a speaker and a line of text
    pub fn key(source: SourceId, text: &str) -> String {
        format!("{}:{}", source, normalize_line_breaks(text))
    }

    /// Decide whether a line may play now, recording it if so.
    ///
    /// `now_ms` must come from a monotonic clock.
    pub fn admit(&mut self, source: SourceId, text: &str, cooldown_ms: u64, now_ms: u64) -> bool {
        let key = Self::key(source, text);

        if let Some(&last) = self.last_played.get(&key) {
            if now_ms.saturating_sub(last) < cooldown_ms {
                trace!(%key, "Suppressed repeat inside cooldown");
                return false;
            }
        }

        self.last_played.insert(key, now_ms);
        self.sweep(cooldown_ms, now_ms);
        true
    }

    /// Forget an admission whose line never got queued
    pub fn revoke(&mut self, source: SourceId, text: &str) {
        if self.last_played.remove(&Self::key(source, text)).is_some() {
            trace!(%source, "Revoked gate admission");
        }
    }

    /// Number of remembered keys
    pub fn len(&self) -> usize {
        self.last_played.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_played.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_played.clear();
    }

    fn sweep(&mut self, cooldown_ms: u64, now_ms: u64) {
        if now_ms.saturating_sub(self.last_sweep_ms) >= self.limits.sweep_interval_ms {
            let before = self.last_played.len();
            // Entries at or past the cooldown can no longer suppress anything
            self.last_played
                .retain(|_, &mut last| now_ms.saturating_sub(last) < cooldown_ms);
            self.last_sweep_ms = now_ms;

            let swept = before - self.last_played.len();
            if swept > 0 {
                debug!(swept, remaining = self.last_played.len(), "Swept expired gate entries");
            }
        }

        while self.limits.max_entries > 0 && self.last_played.len() > self.limits.max_entries {
            let oldest = self
                .last_played
                .iter()
                .min_by_key(|&(_, last)| *last)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    self.last_played.remove(&key);
                }
                None => break,
            }
        }
    }
}
