pub mod cache;
pub mod edge;
pub mod generator;

pub use cache::SpeechCache;
pub use edge::EdgeTtsClient;
pub use generator::{GeneratedSpeech, SpeechGenerator};

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A single word-boundary timing event from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBoundary {
    /// Offset of the word from the start of the audio.
    pub offset: Duration,
    /// How long the word is spoken for.
    pub duration: Duration,
    pub text: String,
}

/// Parameters for one synthesis call. Rate and volume are signed
/// percentage strings ("+0%"), pitch is a signed Hz string ("+0Hz").
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub rate: String,
    pub volume: String,
    pub pitch: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            rate: "+0%".to_string(),
            volume: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
        }
    }
}

/// Collected output of a synthesis call: the full audio stream and the
/// word-boundary events that arrived alongside it.
#[derive(Debug, Default)]
pub struct SynthesisOutput {
    pub audio: Vec<u8>,
    pub word_boundaries: Vec<WordBoundary>,
}

/// Voice metadata returned by `list_voices`.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceInfo {
    pub name: String,
    pub short_name: String,
    pub gender: String,
    pub locale: String,
}

/// Pluggable speech synthesis backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize narration, collecting the streamed audio and timing
    /// events into owned buffers before returning.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutput>;

    /// List all voices the provider offers.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>>;

    fn name(&self) -> &'static str;
}

/// Preferred neural voice per language code.
pub fn default_voice_for_language(language: &str) -> &'static str {
    match language {
        "en" => "en-US-AvaMultilingualNeural",
        "fr" => "fr-FR-VivienneMultilingualNeural",
        "ko" => "ko-KR-HyunsuMultilingualNeural",
        "hi" => "hi-IN-MadhurNeural",
        "kn" => "kn-IN-GaganNeural",
        "ta" => "ta-IN-ValluvarNeural",
        "te" => "te-IN-ShrutiNeural",
        "ml" => "ml-IN-SobhanaNeural",
        "es" => "es-ES-ElviraNeural",
        "de" => "de-DE-KatjaNeural",
        "it" => "it-IT-ElsaNeural",
        "pt" => "pt-BR-FranciscaNeural",
        "zh" => "zh-CN-XiaoxiaoNeural",
        "ja" => "ja-JP-NanamiNeural",
        "ar" => "ar-SA-ZariyahNeural",
        "ru" => "ru-RU-SvetlanaNeural",
        _ => "en-US-AvaMultilingualNeural",
    }
}
