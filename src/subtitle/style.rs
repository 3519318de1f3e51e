use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SubtitleEntry;
use crate::error::Result;

/// How the subtitle background is rendered. The three modes are mutually
/// exclusive and map onto ASS `BorderStyle`/`Outline`/`Shadow` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BorderMode {
    /// Outlined text with a drop shadow.
    #[default]
    OutlineShadow,
    /// Outlined text, no shadow.
    OutlineOnly,
    /// Text on an opaque box, no outline.
    OpaqueBox,
}

/// Presentation styling for one segment's burned-in subtitles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleStyle {
    pub font_family: String,
    pub font_size: u32,
    /// ASS colour strings, `&HAABBGGRR` byte order.
    pub primary_colour: String,
    pub outline_colour: String,
    pub back_colour: String,
    /// Whether any border/outline rendering was requested at all. When
    /// false the styler falls back to an opaque box: outline-less light
    /// text over light video is unreadable, so bare text is never emitted.
    pub border_enabled: bool,
    pub border_mode: BorderMode,
    pub outline_width: f64,
    pub shadow_distance: f64,
    /// Vertical margin from the bottom edge, pixels.
    pub margin_v: u32,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_family: "Roboto".to_string(),
            font_size: 20,
            primary_colour: "&H00FFFFFF".to_string(),
            outline_colour: "&H00000000".to_string(),
            back_colour: "&H80000000".to_string(),
            border_enabled: true,
            border_mode: BorderMode::default(),
            outline_width: 2.0,
            shadow_distance: 0.0,
            margin_v: 30,
        }
    }
}

/// The concrete ASS field values a style resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStyle {
    pub border_style: u8,
    pub outline: f64,
    pub shadow: f64,
    pub back_colour: String,
}

impl SubtitleStyle {
    /// Resolve the border configuration to ASS fields.
    ///
    /// Disabled borders MUST render as an opaque box rather than bare
    /// text; this is a correctness requirement, not a preference.
    pub fn resolve(&self) -> ResolvedStyle {
        if !self.border_enabled {
            return ResolvedStyle {
                border_style: 3,
                outline: 0.0,
                shadow: 0.0,
                back_colour: "&H80000000".to_string(),
            };
        }

        match self.border_mode {
            BorderMode::OutlineShadow => ResolvedStyle {
                border_style: 1,
                outline: self.outline_width,
                shadow: self.shadow_distance,
                back_colour: self.back_colour.clone(),
            },
            BorderMode::OutlineOnly => ResolvedStyle {
                border_style: 1,
                outline: self.outline_width,
                shadow: 0.0,
                back_colour: self.back_colour.clone(),
            },
            BorderMode::OpaqueBox => ResolvedStyle {
                border_style: 3,
                outline: 0.0,
                shadow: 0.0,
                back_colour: self.back_colour.clone(),
            },
        }
    }

    /// Substitute a language-appropriate font when the requested family
    /// lacks glyph coverage for the segment's script. Deterministic for a
    /// given (language, requested font) pair.
    pub fn effective_font(&self, language: &str) -> String {
        let language_font = default_font_for_language(language);

        // Latin-script fonts cannot render Indic/CJK scripts; anything the
        // language table maps away from the generic default wins.
        if language_font != "Arial" && language_font != "Roboto" && self.font_family == "Roboto" {
            return language_font.to_string();
        }
        self.font_family.clone()
    }
}

/// Language-specific default fonts for scripts the common Latin families
/// cannot cover.
pub fn default_font_for_language(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "en" | "english" | "fr" | "french" => "Roboto",
        "hi" | "hindi" => "Noto Sans Devanagari",
        "ta" | "tamil" => "Noto Sans Tamil",
        "te" | "telugu" => "Noto Sans Telugu",
        "kn" | "kannada" => "Noto Sans Kannada",
        "ml" | "malayalam" => "Noto Sans Malayalam",
        "ko" | "korean" => "Noto Sans KR",
        _ => "Arial",
    }
}

/// Write a complete ASS subtitle file for the given cues and style.
pub fn write_ass(
    entries: &[SubtitleEntry],
    style: &SubtitleStyle,
    language: &str,
    output: &Path,
) -> Result<()> {
    let resolved = style.resolve();
    let font = style.effective_font(language);

    let mut doc = String::new();
    doc.push_str("[Script Info]\n");
    doc.push_str("ScriptType: v4.00+\n");
    doc.push_str("WrapStyle: 0\n");
    doc.push_str("ScaledBorderAndShadow: yes\n");
    doc.push_str("YCbCr Matrix: None\n\n");

    doc.push_str("[V4+ Styles]\n");
    doc.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    doc.push_str(&format!(
        "Style: Default,{},{},{},&H000000FF,{},{},-1,0,0,0,100,100,0,0,{},{},{},2,10,10,{},0\n\n",
        font,
        style.font_size,
        style.primary_colour,
        style.outline_colour,
        resolved.back_colour,
        resolved.border_style,
        resolved.outline,
        resolved.shadow,
        style.margin_v,
    ));

    doc.push_str("[Events]\n");
    doc.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for entry in entries {
        doc.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
            format_ass_timestamp(entry.start),
            format_ass_timestamp(entry.end),
            entry.text.replace('\n', "\\N"),
        ));
    }

    std::fs::write(output, doc)?;
    debug!("Wrote styled ASS subtitles: {}", output.display());
    Ok(())
}

fn format_ass_timestamp(d: std::time::Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let centis = d.subsec_millis() / 10;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_disabled_borders_fall_back_to_opaque_box() {
        let style = SubtitleStyle {
            border_enabled: false,
            border_mode: BorderMode::OutlineShadow,
            ..SubtitleStyle::default()
        };

        let resolved = style.resolve();
        assert_eq!(resolved.border_style, 3);
        assert_eq!(resolved.outline, 0.0);
        assert_eq!(resolved.shadow, 0.0);
        assert_eq!(resolved.back_colour, "&H80000000");
    }

    #[test]
    fn test_border_modes_are_mutually_exclusive() {
        let base = SubtitleStyle {
            outline_width: 1.5,
            shadow_distance: 2.0,
            ..SubtitleStyle::default()
        };

        let with_shadow = SubtitleStyle {
            border_mode: BorderMode::OutlineShadow,
            ..base.clone()
        }
        .resolve();
        assert_eq!(with_shadow.border_style, 1);
        assert_eq!(with_shadow.outline, 1.5);
        assert_eq!(with_shadow.shadow, 2.0);

        let outline_only = SubtitleStyle {
            border_mode: BorderMode::OutlineOnly,
            ..base.clone()
        }
        .resolve();
        assert_eq!(outline_only.border_style, 1);
        assert_eq!(outline_only.shadow, 0.0);

        let boxed = SubtitleStyle {
            border_mode: BorderMode::OpaqueBox,
            ..base
        }
        .resolve();
        assert_eq!(boxed.border_style, 3);
        assert_eq!(boxed.outline, 0.0);
    }

    #[test]
    fn test_language_font_substitution_is_deterministic() {
        assert_eq!(default_font_for_language("hi"), "Noto Sans Devanagari");
        assert_eq!(default_font_for_language("ko"), "Noto Sans KR");
        assert_eq!(default_font_for_language("en"), "Roboto");
        assert_eq!(default_font_for_language("xx"), "Arial");

        let style = SubtitleStyle::default();
        assert_eq!(style.effective_font("hi"), "Noto Sans Devanagari");
        assert_eq!(style.effective_font("hi"), style.effective_font("hi"));
        assert_eq!(style.effective_font("en"), "Roboto");

        // Explicit non-default choice is respected
        let custom = SubtitleStyle {
            font_family: "Noto Serif".to_string(),
            ..SubtitleStyle::default()
        };
        assert_eq!(custom.effective_font("hi"), "Noto Serif");
    }

    #[test]
    fn test_format_ass_timestamp() {
        assert_eq!(
            format_ass_timestamp(Duration::from_millis(1500)),
            "0:00:01.50"
        );
        assert_eq!(
            format_ass_timestamp(Duration::from_secs(3661)),
            "1:01:01.00"
        );
    }

    #[test]
    fn test_write_ass_contains_style_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ass");

        let entries = vec![SubtitleEntry {
            index: 1,
            start: Duration::from_secs(1),
            end: Duration::from_secs(3),
            text: "Line one\nLine two".to_string(),
        }];

        let style = SubtitleStyle {
            border_enabled: false,
            ..SubtitleStyle::default()
        };
        write_ass(&entries, &style, "en", &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[V4+ Styles]"));
        // Opaque-box fallback lands in the style line (BorderStyle=3)
        assert!(content.contains(",3,0,0,2,10,10,30,0"));
        assert!(content.contains("Dialogue: 0,0:00:01.00,0:00:03.00,Default"));
        assert!(content.contains("Line one\\NLine two"));
    }
}
