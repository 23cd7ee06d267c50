//! Capability and modality vocabulary shared by every registry.
//!
//! A capability is a single bit so a backend module can advertise several
//! of them as one [`CapabilitySet`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete AI function a backend can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    TextGeneration,
    Embeddings,
    SpeechToText,
    TextToSpeech,
    VoiceActivityDetection,
    SpeakerDiarization,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::TextGeneration,
        Capability::Embeddings,
        Capability::SpeechToText,
        Capability::TextToSpeech,
        Capability::VoiceActivityDetection,
        Capability::SpeakerDiarization,
    ];

    /// Bit position of this capability inside a [`CapabilitySet`].
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextGeneration => "text_generation",
            Self::Embeddings => "embeddings",
            Self::SpeechToText => "speech_to_text",
            Self::TextToSpeech => "text_to_speech",
            Self::VoiceActivityDetection => "voice_activity_detection",
            Self::SpeakerDiarization => "speaker_diarization",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TextGeneration => "TextGeneration",
            Self::Embeddings => "Embeddings",
            Self::SpeechToText => "SpeechToText",
            Self::TextToSpeech => "TextToSpeech",
            Self::VoiceActivityDetection => "VoiceActivityDetection",
            Self::SpeakerDiarization => "SpeakerDiarization",
        };
        f.write_str(name)
    }
}

/// Bitmask of capabilities advertised by a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u32) -> Self {
        let known = Capability::ALL.iter().fold(0, |acc, c| acc | c.bit());
        Self(bits & known)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn remove(&mut self, capability: Capability) {
        self.0 &= !capability.bit();
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Capabilities in the set, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl From<Capability> for CapabilitySet {
    fn from(capability: Capability) -> Self {
        Self(capability.bit())
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// Tracked category of loadable model state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Modality {
    Llm,
    Stt,
    Tts,
    Vad,
    Diarization,
    WakeWord,
}

impl Modality {
    pub const ALL: [Modality; 6] = [
        Modality::Llm,
        Modality::Stt,
        Modality::Tts,
        Modality::Vad,
        Modality::Diarization,
        Modality::WakeWord,
    ];

    /// Capability a model of this modality is served through.
    ///
    /// Wake-word models have no registry capability and are driven by the
    /// host directly.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Self::Llm => Some(Capability::TextGeneration),
            Self::Stt => Some(Capability::SpeechToText),
            Self::Tts => Some(Capability::TextToSpeech),
            Self::Vad => Some(Capability::VoiceActivityDetection),
            Self::Diarization => Some(Capability::SpeakerDiarization),
            Self::WakeWord => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Stt => "stt",
            Self::Tts => "tts",
            Self::Vad => "vad",
            Self::Diarization => "diarization",
            Self::WakeWord => "wake_word",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inference framework a model is executed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceFramework {
    LlamaCpp,
    Onnx,
    WhisperCpp,
    FoundationModels,
    SystemTts,
    FluidAudio,
    Builtin,
    #[default]
    Unknown,
}

impl InferenceFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlamaCpp => "llama_cpp",
            Self::Onnx => "onnx",
            Self::WhisperCpp => "whisper_cpp",
            Self::FoundationModels => "foundation_models",
            Self::SystemTts => "system_tts",
            Self::FluidAudio => "fluid_audio",
            Self::Builtin => "builtin",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InferenceFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
