//! Distance attenuation for floating speech
//!
//! Speech from other actors gets quieter the further away they stand. The
//! gain is a linear falloff between `max_ratio` (standing on the listener)
//! and `min_ratio` (at `max_distance` tiles or beyond), applied to the
//! speaker's configured volume and handed to the synthesis backend as a
//! relative prosody volume such as `-34%`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Percentage the backend treats as "unchanged"
pub const DEFAULT_VOLUME: f64 = 100.0;

/// Absorbs binary rounding in `base * ratio` before truncating to whole percent
const ROUNDING_SLACK: f64 = 1e-9;

/// Falloff parameters
///
/// `min_ratio` and `max_ratio` may be equal (flat) or inverted; the
/// calculator does not reorder them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttenuationConfig {
    pub min_ratio: f64,
    pub max_ratio: f64,
    /// Distance in tiles at which `min_ratio` is reached
    pub max_distance: u32,
}

impl Default for AttenuationConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.11,
            max_ratio: 0.66,
            max_distance: 8,
        }
    }
}

impl AttenuationConfig {
    /// Gain ratio at `distance` tiles
    pub fn ratio(&self, distance: u32) -> f64 {
        if distance >= self.max_distance {
            return self.min_ratio;
        }
        let falloff = 1.0 - f64::from(distance) / f64::from(self.max_distance);
        self.min_ratio + falloff * (self.max_ratio - self.min_ratio)
    }
}

/// Signed offset from the default volume, in whole percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeAdjustment(i32);

impl VolumeAdjustment {
    pub fn new(percent: i32) -> Self {
        Self(percent)
    }

    pub fn percent(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for VolumeAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}%", self.0)
    }
}

fn parse_percent(number: &str) -> Option<f64> {
    number
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse a symbolic volume into an absolute percentage.
///
/// Accepts `default`, `silent`, `+N%`, `-N%` and bare numbers. Anything else
/// falls back to [`DEFAULT_VOLUME`]. Relative forms are not clamped, so
/// `-250%` is `-150`.
pub fn parse_volume(volume: &str) -> f64 {
    let trimmed = volume.trim();
    if trimmed.eq_ignore_ascii_case("default") {
        return DEFAULT_VOLUME;
    }
    if trimmed.eq_ignore_ascii_case("silent") {
        return 0.0;
    }

    let parsed = if let Some(rest) = trimmed.strip_prefix('+') {
        parse_percent(rest).map(|n| DEFAULT_VOLUME + n)
    } else if let Some(rest) = trimmed.strip_prefix('-') {
        parse_percent(rest).map(|n| DEFAULT_VOLUME - n)
    } else {
        parse_percent(trimmed)
    };

    parsed.unwrap_or_else(|| {
        warn!(volume, "Unparseable volume, using default");
        DEFAULT_VOLUME
    })
}

/// Volume adjustment for a speaker `distance` tiles away whose configured
/// volume is `base_volume`.
pub fn attenuate(distance: u32, base_volume: &str, config: &AttenuationConfig) -> VolumeAdjustment {
    let effective = parse_volume(base_volume) * config.ratio(distance);
    let offset = effective - DEFAULT_VOLUME;
    let nudged = offset + offset.signum() * ROUNDING_SLACK;
    VolumeAdjustment(nudged.trunc() as i32)
}
