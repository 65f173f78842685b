//! Domain entities and business rules

pub mod attenuation;
pub mod audio;
pub mod config;
pub mod gate;
pub mod mixer;
pub mod stream;
pub mod synthesis;
pub mod text;
pub mod voice;

// Re-export specific items to avoid ambiguous glob imports
pub use attenuation::{attenuate, parse_volume, AttenuationConfig, VolumeAdjustment};
pub use audio::{
    AudioError, AudioFormat, OutputLine, SourceClass, SourceId, BYTES_PER_SAMPLE,
    CHUNK_BYTES, SAMPLES_PER_CHUNK, SAMPLE_RATE,
};
pub use config::{
    AppConfig, ConfigError, ConfigManager, ConfigWatcher, MixerConfig, ParleyConfig,
    PlaybackSettings, SynthesisConfig,
};
pub use gate::{GateLimits, PlaybackGate};
pub use mixer::{MixBus, MixReport};
pub use stream::{PcmSource, PcmStream};
pub use synthesis::{
    PlaybackRequest, SpeechAudio, SpeechSynthesizer, SynthesisError, SynthesisRequest, VoiceInfo,
};
pub use text::{normalize_line_breaks, sanitize};
pub use voice::{Gender, GenderClassifier, UnknownGender, VoiceProfile, VoiceSettings};
