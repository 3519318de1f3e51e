pub mod style;

pub use style::{default_font_for_language, BorderMode, SubtitleStyle};

use std::time::Duration;

use regex::Regex;

use crate::error::{ExportError, Result};
use crate::tts::WordBoundary;

/// Target line length when grouping word boundaries into cues.
const MAX_CUE_CHARS: usize = 45;

/// One timed subtitle cue.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Group word-boundary timing events into readable cues.
///
/// Words accumulate until a cue reaches the length ceiling; each cue spans
/// from its first word's offset to the end of its last word.
pub fn entries_from_word_boundaries(boundaries: &[WordBoundary]) -> Vec<SubtitleEntry> {
    let mut entries = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut chars = 0usize;
    let mut cue_start = Duration::ZERO;
    let mut cue_end = Duration::ZERO;

    for boundary in boundaries {
        if words.is_empty() {
            cue_start = boundary.offset;
        }
        words.push(&boundary.text);
        chars += boundary.text.len() + 1;
        cue_end = boundary.offset + boundary.duration;

        if chars >= MAX_CUE_CHARS {
            entries.push(SubtitleEntry {
                index: entries.len() + 1,
                start: cue_start,
                end: cue_end,
                text: words.join(" "),
            });
            words.clear();
            chars = 0;
        }
    }

    if !words.is_empty() {
        entries.push(SubtitleEntry {
            index: entries.len() + 1,
            start: cue_start,
            end: cue_end,
            text: words.join(" "),
        });
    }

    entries
}

/// Fallback cue layout when the provider returned no word boundaries:
/// split the narration into readable chunks and distribute the measured
/// audio duration evenly across them.
pub fn entries_from_plain_text(text: &str, audio_duration: f64) -> Vec<SubtitleEntry> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut length = 0usize;

    for word in text.split_whitespace() {
        current.push(word);
        length += word.len() + 1;
        if length >= MAX_CUE_CHARS {
            chunks.push(current.join(" "));
            current.clear();
            length = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }

    let per_chunk = audio_duration / chunks.len() as f64;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| SubtitleEntry {
            index: i + 1,
            start: Duration::from_secs_f64(per_chunk * i as f64),
            end: Duration::from_secs_f64((per_chunk * (i + 1) as f64).min(audio_duration)),
            text,
        })
        .collect()
}

/// Format entries as an SRT document.
pub fn format_srt(entries: &[SubtitleEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}\n{} --> {}\n{}\n",
                entry.index,
                format_srt_timestamp(entry.start),
                format_srt_timestamp(entry.end),
                entry.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse an SRT document into entries. Malformed blocks are rejected.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleEntry>> {
    let timing_re = Regex::new(
        r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})",
    )
    .expect("valid regex");

    let mut entries = Vec::new();

    for block in content.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut lines = block.lines();
        let index_line = lines.next().unwrap_or_default().trim();
        let timing_line = lines.next().unwrap_or_default();

        let index: usize = index_line.parse().map_err(|_| {
            ExportError::Validation(format!("Invalid SRT cue index: '{index_line}'"))
        })?;

        let caps = timing_re.captures(timing_line).ok_or_else(|| {
            ExportError::Validation(format!("Invalid SRT timing line: '{timing_line}'"))
        })?;

        let ts = |h: usize, m: usize, s: usize, ms: usize| -> Duration {
            let parse = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
            Duration::from_millis(
                parse(h) * 3_600_000 + parse(m) * 60_000 + parse(s) * 1_000 + parse(ms),
            )
        };

        let text = lines.collect::<Vec<_>>().join("\n");
        entries.push(SubtitleEntry {
            index,
            start: ts(1, 2, 3, 4),
            end: ts(5, 6, 7, 8),
            text,
        });
    }

    Ok(entries)
}

fn format_srt_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(offset_ms: u64, duration_ms: u64, text: &str) -> WordBoundary {
        WordBoundary {
            offset: Duration::from_millis(offset_ms),
            duration: Duration::from_millis(duration_ms),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(
            format_srt_timestamp(Duration::from_millis(1500)),
            "00:00:01,500"
        );
        assert_eq!(
            format_srt_timestamp(Duration::from_secs(3661) + Duration::from_millis(123)),
            "01:01:01,123"
        );
    }

    #[test]
    fn test_entries_from_word_boundaries_groups_words() {
        let boundaries: Vec<WordBoundary> = (0..20)
            .map(|i| boundary(i * 300, 250, "narration"))
            .collect();

        let entries = entries_from_word_boundaries(&boundaries);
        assert!(entries.len() > 1);
        // Cues are contiguous in index and monotonic in time
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.index, i + 1);
            assert!(entry.end > entry.start);
        }
        assert_eq!(entries[0].start, Duration::ZERO);
    }

    #[test]
    fn test_entries_from_plain_text_covers_audio() {
        let text = "one two three four five six seven eight nine ten \
                    eleven twelve thirteen fourteen fifteen";
        let entries = entries_from_plain_text(text, 10.0);

        assert!(!entries.is_empty());
        assert_eq!(entries.first().unwrap().start, Duration::ZERO);
        assert_eq!(
            entries.last().unwrap().end,
            Duration::from_secs_f64(10.0)
        );
    }

    #[test]
    fn test_srt_round_trip() {
        let entries = vec![
            SubtitleEntry {
                index: 1,
                start: Duration::from_millis(1500),
                end: Duration::from_millis(4000),
                text: "Hello, world!".to_string(),
            },
            SubtitleEntry {
                index: 2,
                start: Duration::from_millis(4500),
                end: Duration::from_millis(7000),
                text: "This is a test.".to_string(),
            },
        ];

        let srt = format_srt(&entries);
        let parsed = parse_srt(&srt).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn test_parse_srt_rejects_garbage() {
        assert!(parse_srt("not\nan srt\nfile").is_err());
    }
}
