use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExportError, Result};
use crate::subtitle::style::SubtitleStyle;

/// One narrated span of the timeline: a time range over the source video,
/// the text spoken across it, and how its subtitles look.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// Start of the span on the source video, seconds.
    pub start_time: f64,
    /// End of the span on the source video, seconds. Exclusive.
    pub end_time: f64,
    pub text: String,
    /// Language code, e.g. "en" or "ta". Drives voice and font defaults.
    pub language: String,
    /// Explicit provider voice. None picks the default for `language`.
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_rate")]
    pub rate: String,
    #[serde(default = "default_volume")]
    pub volume: String,
    #[serde(default = "default_pitch")]
    pub pitch: String,
    #[serde(default = "default_true")]
    pub subtitle_enabled: bool,
    #[serde(default)]
    pub style: SubtitleStyle,
}

fn default_rate() -> String {
    "+0%".to_string()
}

fn default_volume() -> String {
    "+0%".to_string()
}

fn default_pitch() -> String {
    "+0Hz".to_string()
}

fn default_true() -> bool {
    true
}

impl Segment {
    pub fn new(
        name: impl Into<String>,
        start_time: f64,
        end_time: f64,
        text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_time,
            end_time,
            text: text.into(),
            language: language.into(),
            voice: None,
            rate: default_rate(),
            volume: default_volume(),
            pitch: default_pitch(),
            subtitle_enabled: true,
            style: SubtitleStyle::default(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ExportError::Validation(
                "Segment name cannot be empty".to_string(),
            ));
        }
        if self.start_time < 0.0 {
            return Err(ExportError::Validation(format!(
                "Segment '{}' starts before 0 ({:.2}s)",
                self.name, self.start_time
            )));
        }
        if self.end_time <= self.start_time {
            return Err(ExportError::Validation(format!(
                "Segment '{}' must end after it starts ({:.2}s..{:.2}s)",
                self.name, self.start_time, self.end_time
            )));
        }
        if self.text.trim().is_empty() {
            return Err(ExportError::Validation(format!(
                "Segment '{}' has no narration text",
                self.name
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ExportError::Validation(format!(
                "Segment '{}' has no language",
                self.name
            )));
        }
        Ok(())
    }

    /// True when two segments' time ranges intersect.
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_segment() {
        let segment = Segment::new("Intro", 0.0, 5.0, "Welcome", "en");
        assert!(segment.validate().is_ok());
        assert_eq!(segment.duration(), 5.0);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(Segment::new("A", -1.0, 5.0, "x", "en").validate().is_err());
        assert!(Segment::new("A", 5.0, 5.0, "x", "en").validate().is_err());
        assert!(Segment::new("A", 5.0, 3.0, "x", "en").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(Segment::new("", 0.0, 5.0, "x", "en").validate().is_err());
        assert!(Segment::new("A", 0.0, 5.0, "  ", "en").validate().is_err());
        assert!(Segment::new("A", 0.0, 5.0, "x", "").validate().is_err());
    }

    #[test]
    fn test_overlap_detection() {
        let a = Segment::new("A", 0.0, 5.0, "x", "en");
        let b = Segment::new("B", 4.0, 8.0, "x", "en");
        let c = Segment::new("C", 5.0, 8.0, "x", "en");
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        // Touching endpoints do not overlap
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let toml = r#"
            name = "Intro"
            start_time = 0.0
            end_time = 4.5
            text = "Hello"
            language = "en"
        "#;
        let segment: Segment = toml::from_str(toml).unwrap();
        assert_eq!(segment.rate, "+0%");
        assert_eq!(segment.pitch, "+0Hz");
        assert!(segment.subtitle_enabled);
        assert!(segment.voice.is_none());
    }
}
