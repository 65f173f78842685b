//! Mapping host game events to playback requests

use crate::playback::orchestrator::{Dispatch, PlaybackOrchestrator};
use parley_core::domain::audio::{SourceClass, SourceId};
use parley_core::domain::config::PlaybackSettings;
use parley_core::domain::synthesis::PlaybackRequest;
use parley_core::domain::voice::{GenderClassifier, VoiceProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Who is talking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Speaker {
    /// The player running the client
    LocalPlayer { id: i32 },
    /// Any other player
    Player { id: i32 },
    Npc { id: i32, name: String },
}

impl Speaker {
    pub fn id(&self) -> i32 {
        match self {
            Speaker::LocalPlayer { id } | Speaker::Player { id } | Speaker::Npc { id, .. } => *id,
        }
    }
}

/// Events produced by the host game client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NarrationEvent {
    LoggedIn,
    DialogueOpened {
        speaker: Speaker,
        text: String,
    },
    DialogueClosed,
    OverheadText {
        speaker: Speaker,
        text: String,
        /// Tiles between the speaker and the local player
        #[serde(default)]
        distance: u32,
    },
    Examine {
        text: String,
        player_id: i32,
    },
    /// The player is about to talk to an NPC
    GenderHint {
        id: i32,
        name: String,
    },
}

/// Strip a leading `"<name>"` and optional `":"` from dialogue text
fn strip_speaker_name<'a>(text: &'a str, name: &str) -> &'a str {
    let name = name.trim();
    if name.is_empty() {
        return text.trim();
    }
    match text.trim_start().strip_prefix(name) {
        Some(rest) => {
            let rest = rest.trim_start();
            rest.strip_prefix(':').unwrap_or(rest).trim()
        }
        None => text.trim(),
    }
}

/// Per-session narration state on top of an orchestrator
pub struct Narrator {
    orchestrator: Arc<PlaybackOrchestrator>,
    classifier: Arc<dyn GenderClassifier>,
    greeted: bool,
    dialogue_active: bool,
    dialogue_npc: Option<i32>,
}

impl Narrator {
    pub fn new(orchestrator: Arc<PlaybackOrchestrator>, classifier: Arc<dyn GenderClassifier>) -> Self {
        Self {
            orchestrator,
            classifier,
            greeted: false,
            dialogue_active: false,
            dialogue_npc: None,
        }
    }

    pub fn is_dialogue_active(&self) -> bool {
        self.dialogue_active
    }

    /// Handle one event. `None` means the event produced no request.
    pub fn handle(&mut self, event: NarrationEvent) -> Option<Dispatch> {
        let settings = self.orchestrator.settings();

        match event {
            NarrationEvent::LoggedIn => {
                if self.greeted {
                    return None;
                }
                self.greeted = true;
                info!("Logged in, playing greeting");
                Some(self.speak(
                    settings.greeting.clone(),
                    settings.voices.player.clone(),
                    SourceClass::Dialogue,
                    SourceId::None,
                ))
            }

            NarrationEvent::DialogueOpened { speaker, text } => {
                self.dialogue_active = true;
                self.orchestrator.stop_dialogue();

                let line = match &speaker {
                    Speaker::Npc { id, name } => {
                        self.dialogue_npc = Some(*id);
                        strip_speaker_name(&text, name).to_string()
                    }
                    Speaker::LocalPlayer { .. } | Speaker::Player { .. } => text.trim().to_string(),
                };
                if line.is_empty() {
                    return None;
                }

                let profile = self.profile_for(&settings, &speaker);
                Some(self.speak(line, profile, SourceClass::Dialogue, SourceId::Entity(speaker.id())))
            }

            NarrationEvent::DialogueClosed => {
                self.dialogue_active = false;
                self.dialogue_npc = None;
                self.orchestrator.stop_dialogue();
                None
            }

            NarrationEvent::OverheadText {
                speaker,
                text,
                distance,
            } => {
                if text.trim().is_empty() {
                    return None;
                }
                if self.dialogue_active && settings.block_floating_while_dialogue {
                    debug!("Dialogue open, ignoring overhead text");
                    return None;
                }
                if let Speaker::Npc { id, .. } = &speaker {
                    if self.dialogue_npc == Some(*id) {
                        return None;
                    }
                }

                let profile = self.profile_for(&settings, &speaker);
                let profile = match speaker {
                    Speaker::LocalPlayer { .. } => profile,
                    Speaker::Player { .. } | Speaker::Npc { .. } => {
                        let volume = self.orchestrator.attenuated_volume(&profile.volume, distance);
                        profile.with_volume(volume)
                    }
                };
                Some(self.speak(text, profile, SourceClass::Floating, SourceId::Entity(speaker.id())))
            }

            NarrationEvent::Examine { text, player_id } => {
                if text.trim().is_empty() {
                    return None;
                }
                Some(self.speak(
                    text,
                    settings.voices.player.clone(),
                    SourceClass::Floating,
                    SourceId::Entity(player_id),
                ))
            }

            NarrationEvent::GenderHint { id, name } => {
                let gender = self.classifier.classify(id, &name);
                debug!(%name, id, %gender, "Pre-classified NPC");
                None
            }
        }
    }

    fn profile_for(&self, settings: &PlaybackSettings, speaker: &Speaker) -> VoiceProfile {
        match speaker {
            Speaker::LocalPlayer { .. } | Speaker::Player { .. } => settings.voices.player.clone(),
            Speaker::Npc { id, name } => {
                let gender = self.classifier.classify(*id, name);
                settings.voices.for_gender(gender).clone()
            }
        }
    }

    fn speak(&self, text: String, profile: VoiceProfile, class: SourceClass, source: SourceId) -> Dispatch {
        self.orchestrator
            .play(PlaybackRequest::new(text, profile, class, source))
    }
}
