//! Timeline-based voice-over video exporter.
//!
//! Turns a timeline of narration segments over source videos into a
//! rendered export with TTS narration, burned-in styled subtitles, and
//! optional looping background music. All media processing goes through
//! FFmpeg; speech synthesis is cached by content so re-exports are free.

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod fonts;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod subtitle;
pub mod tts;

pub use config::{ExportOptions, QualityPreset, Settings};
pub use error::{ExportError, Result};
pub use fonts::{FontProvider, SystemFonts};
pub use model::{Project, Segment, Timeline, Video};
pub use pipeline::{ExportOrchestrator, ExportStage, ExportStats};
pub use tts::{EdgeTtsClient, SpeechCache, SpeechGenerator, SpeechSynthesizer};
