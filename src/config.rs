use crate::error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Constant-quality encoding presets mapped to fixed CRF values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Lossless,
    High,
    #[default]
    Balanced,
}

impl QualityPreset {
    pub fn crf(&self) -> u32 {
        match self {
            QualityPreset::Lossless => 0,
            QualityPreset::High => 18,
            QualityPreset::Balanced => 23,
        }
    }

    pub fn encoder_preset(&self) -> &'static str {
        match self {
            QualityPreset::Lossless | QualityPreset::High => "slow",
            QualityPreset::Balanced => "medium",
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityPreset::Lossless => write!(f, "lossless"),
            QualityPreset::High => write!(f, "high"),
            QualityPreset::Balanced => write!(f, "balanced"),
        }
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lossless" => Ok(QualityPreset::Lossless),
            "high" => Ok(QualityPreset::High),
            "balanced" => Ok(QualityPreset::Balanced),
            _ => Err(format!(
                "Unknown quality preset: {}. Use 'lossless', 'high', or 'balanced'",
                s
            )),
        }
    }
}

/// Per-export configuration supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub quality: QualityPreset,
    pub include_subtitles: bool,
    pub background_music: Option<PathBuf>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            quality: QualityPreset::default(),
            include_subtitles: true,
            background_music: None,
        }
    }
}

/// Application-wide settings with environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory for the speech cache mapping and generated artifacts.
    pub cache_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Simultaneous TTS network calls (provider rate limit).
    pub max_concurrent_tts: usize,
    /// Delay between successive TTS dispatches, milliseconds.
    pub tts_dispatch_delay_ms: u64,
    /// Narration character ceiling per segment.
    pub max_text_length: usize,
    pub video_codec: String,
    pub audio_codec: String,
    /// Narration gain applied when mixing against other audio, dB.
    pub tts_volume_boost_db: u32,
    /// Background music attenuation, dB.
    pub bgm_volume_reduction_db: u32,
    /// Background music fade-out length, seconds.
    pub fade_duration: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("voxover"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            max_concurrent_tts: 2,
            tts_dispatch_delay_ms: 500,
            max_text_length: 8_000,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            tts_volume_boost_db: 3,
            bgm_volume_reduction_db: 16,
            fade_duration: 3.0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_settings) = toml::from_str::<Settings>(&contents) {
                    settings = file_settings;
                }
            }
        }

        // Override with environment variables
        if let Ok(path) = std::env::var("VOXOVER_FFMPEG_PATH") {
            settings.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("VOXOVER_FFPROBE_PATH") {
            settings.ffprobe_path = path;
        }
        if let Ok(dir) = std::env::var("VOXOVER_CACHE_DIR") {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Ok(n) = std::env::var("VOXOVER_MAX_CONCURRENT_TTS") {
            if let Ok(n) = n.parse() {
                settings.max_concurrent_tts = n;
            }
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tts == 0 {
            return Err(ExportError::Validation(
                "max_concurrent_tts must be greater than 0".to_string(),
            ));
        }
        if self.fade_duration < 0.0 {
            return Err(ExportError::Validation(
                "fade_duration cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("voxover").join("config.toml"))
    }
}
