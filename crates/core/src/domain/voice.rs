//! Voice profiles and the gender classification boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification result for a speaking entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for Gender {
    type Err = std::convert::Infallible;

    /// Anything other than `male` or `female` is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "male" => Gender::Male,
            "female" => Gender::Female,
            _ => Gender::Unknown,
        })
    }
}

/// Maps an entity to a gender. Implementations own their caching.
pub trait GenderClassifier: Send + Sync {
    fn classify(&self, id: i32, name: &str) -> Gender;
}

/// Classifier used when no external service is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownGender;

impl GenderClassifier for UnknownGender {
    fn classify(&self, _id: i32, _name: &str) -> Gender {
        Gender::Unknown
    }
}

/// Voice, pitch and volume handed to the synthesis backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice: String,
    /// `default` or a signed percentage such as `+10%`
    pub pitch: String,
    /// `default`, `silent` or a signed percentage
    pub volume: String,
}

impl VoiceProfile {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            pitch: "default".to_string(),
            volume: "default".to_string(),
        }
    }

    /// Same voice and pitch at another volume
    pub fn with_volume(&self, volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            ..self.clone()
        }
    }
}

/// Configured voices for the player and for NPCs by gender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub player: VoiceProfile,
    pub npc_male: VoiceProfile,
    pub npc_female: VoiceProfile,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            player: VoiceProfile::new("en-US-AriaNeural"),
            npc_male: VoiceProfile::new("en-US-GuyNeural"),
            npc_female: VoiceProfile::new("en-US-AriaNeural"),
        }
    }
}

impl VoiceSettings {
    /// Profile for an NPC; unknown genders use the player's voice.
    pub fn for_gender(&self, gender: Gender) -> &VoiceProfile {
        match gender {
            Gender::Male => &self.npc_male,
            Gender::Female => &self.npc_female,
            Gender::Unknown => &self.player,
        }
    }
}
