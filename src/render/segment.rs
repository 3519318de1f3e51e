use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::RenderedClip;
use crate::config::{QualityPreset, Settings};
use crate::error::{ExportError, Result};
use crate::ffmpeg::Ffmpeg;
use crate::model::Segment;
use crate::subtitle::{self, style};

/// The source-video window a segment's clip will cover after fitting the
/// narration audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentWindow {
    pub start: f64,
    pub effective_end: f64,
    /// True when the narration outlasted the authored range and the
    /// window was extended to hold it.
    pub extended: bool,
}

impl SegmentWindow {
    pub fn duration(&self) -> f64 {
        self.effective_end - self.start
    }
}

/// Fit a segment's window around its narration audio.
///
/// Narration is never truncated: when the audio outlasts the authored
/// range the window extends past `end_time`. The following segment keeps
/// its own authored range; an extension that reaches into it only logs a
/// warning about the overlapping narration.
pub fn plan_segment_window(
    segment: &Segment,
    audio_duration: f64,
    next_start: Option<f64>,
) -> SegmentWindow {
    let authored = segment.duration();
    let extended = audio_duration > authored;
    let effective_end = segment.start_time + authored.max(audio_duration);

    if extended {
        info!(
            "Segment '{}' extended from {:.2}s to {:.2}s to fit narration",
            segment.name, authored, audio_duration
        );
    }
    if let Some(next_start) = next_start {
        if effective_end > next_start {
            warn!(
                "Segment '{}' narration runs {:.2}s past the start of the next segment",
                segment.name,
                effective_end - next_start
            );
        }
    }

    SegmentWindow {
        start: segment.start_time,
        effective_end,
        extended,
    }
}

/// Audio filter graph for mixing narration over the clip.
///
/// With source audio both tracks are mixed with the narration boosted;
/// `duration=longest` keeps the mix alive for whichever track is longer
/// so extended narration is never cut. Without source audio the boosted
/// narration is the only track.
pub fn build_audio_filter(has_source_audio: bool, boost_db: u32) -> String {
    if has_source_audio {
        format!(
            "[1:a]volume={boost_db}dB[narration];\
             [0:a][narration]amix=inputs=2:duration=longest:dropout_transition=0[aout]"
        )
    } else {
        format!("[1:a]volume={boost_db}dB[aout]")
    }
}

/// Escape a path for use inside an FFmpeg filter argument. The escaped
/// form is used bare, never additionally quoted.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Burn-in filter stage for the styled subtitle file.
pub fn build_subtitle_filter(ass_path: &Path) -> String {
    format!("[0:v]ass={}[vout];", escape_filter_path(ass_path))
}

/// Renders one segment into a narrated, subtitled clip.
pub struct SegmentRenderer {
    ffmpeg: Ffmpeg,
    settings: Settings,
    quality: QualityPreset,
}

impl SegmentRenderer {
    pub fn new(ffmpeg: Ffmpeg, settings: Settings, quality: QualityPreset) -> Self {
        Self {
            ffmpeg,
            settings,
            quality,
        }
    }

    /// Render a segment's clip into `work_dir`.
    ///
    /// The clip covers the segment's window on the source video, carries
    /// the narration mixed over any source audio, and has the segment's
    /// styled subtitles burned in when enabled.
    pub fn render(
        &self,
        source_video: &Path,
        segment: &Segment,
        narration_audio: &Path,
        narration_subtitles: Option<&Path>,
        next_start: Option<f64>,
        include_subtitles: bool,
        work_dir: &Path,
    ) -> Result<RenderedClip> {
        let audio_duration = self.ffmpeg.media_duration(narration_audio)?;
        let window = plan_segment_window(segment, audio_duration, next_start);

        let ass_path = if include_subtitles && segment.subtitle_enabled {
            match narration_subtitles {
                Some(srt) => Some(self.prepare_ass(segment, srt, audio_duration, work_dir)?),
                None => {
                    warn!(
                        "Segment '{}' has no subtitle timing, burning none",
                        segment.name
                    );
                    None
                }
            }
        } else {
            None
        };

        let output = work_dir.join(format!("clip_{}.mp4", segment.id));
        let has_source_audio = self.ffmpeg.has_audio_stream(source_video);

        let start_arg = format!("{:.3}", window.start);
        let duration_arg = format!("{:.3}", window.duration());
        let crf_arg = self.quality.crf().to_string();

        let mut filter = String::new();
        if let Some(ass) = &ass_path {
            filter.push_str(&build_subtitle_filter(ass));
        }
        filter.push_str(&build_audio_filter(
            has_source_audio,
            self.settings.tts_volume_boost_db,
        ));

        let video_map = if ass_path.is_some() { "[vout]" } else { "0:v" };

        let source_arg = source_video.to_string_lossy().to_string();
        let narration_arg = narration_audio.to_string_lossy().to_string();
        let output_arg = output.to_string_lossy().to_string();

        let args = [
            "-ss",
            &start_arg,
            "-t",
            &duration_arg,
            "-i",
            &source_arg,
            "-i",
            &narration_arg,
            "-filter_complex",
            &filter,
            "-map",
            video_map,
            "-map",
            "[aout]",
            "-c:v",
            &self.settings.video_codec,
            "-crf",
            &crf_arg,
            "-preset",
            self.quality.encoder_preset(),
            "-c:a",
            &self.settings.audio_codec,
            "-y",
            &output_arg,
        ];

        self.ffmpeg
            .run(&args, &format!("render segment '{}'", segment.name))?;

        debug!(
            "Rendered segment '{}' ({:.2}s..{:.2}s)",
            segment.name, window.start, window.effective_end
        );
        Ok(RenderedClip {
            segment_name: segment.name.clone(),
            path: output,
            source_start: window.start,
            source_end: window.effective_end,
            authored_end: segment.end_time,
        })
    }

    /// Convert the narration's SRT timing into a styled ASS file for the
    /// burn-in filter.
    fn prepare_ass(
        &self,
        segment: &Segment,
        srt_path: &Path,
        audio_duration: f64,
        work_dir: &Path,
    ) -> Result<PathBuf> {
        let entries = match std::fs::read_to_string(srt_path) {
            Ok(contents) => subtitle::parse_srt(&contents)?,
            Err(e) => {
                return Err(ExportError::Render(format!(
                    "Could not read subtitle timing for segment '{}': {e}",
                    segment.name
                )))
            }
        };

        let entries = if entries.is_empty() {
            warn!(
                "Empty subtitle timing for segment '{}', distributing evenly",
                segment.name
            );
            subtitle::entries_from_plain_text(&segment.text, audio_duration)
        } else {
            entries
        };

        let ass_path = work_dir.join(format!("subs_{}.ass", segment.id));
        style::write_ass(&entries, &segment.style, &segment.language, &ass_path)?;
        Ok(ass_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64) -> Segment {
        Segment::new("Test", start, end, "narration", "en")
    }

    #[test]
    fn test_window_keeps_authored_range_when_audio_fits() {
        let window = plan_segment_window(&segment(10.0, 20.0), 7.5, Some(25.0));
        assert_eq!(window.start, 10.0);
        assert_eq!(window.effective_end, 20.0);
        assert!(!window.extended);
    }

    #[test]
    fn test_window_extends_for_long_audio() {
        let window = plan_segment_window(&segment(10.0, 20.0), 14.0, None);
        assert_eq!(window.effective_end, 24.0);
        assert!(window.extended);
        assert_eq!(window.duration(), 14.0);
    }

    #[test]
    fn test_extension_does_not_stop_at_next_segment() {
        // Narration may run past the next segment's start; it is never
        // truncated to avoid the collision.
        let window = plan_segment_window(&segment(10.0, 20.0), 14.0, Some(22.0));
        assert_eq!(window.effective_end, 24.0);
    }

    #[test]
    fn test_audio_filter_with_source_audio() {
        let filter = build_audio_filter(true, 3);
        assert!(filter.contains("volume=3dB"));
        assert!(filter.contains("amix=inputs=2:duration=longest"));
    }

    #[test]
    fn test_audio_filter_without_source_audio() {
        let filter = build_audio_filter(false, 3);
        assert!(filter.contains("volume=3dB"));
        assert!(!filter.contains("amix"));
        assert!(filter.ends_with("[aout]"));
    }

    #[test]
    fn test_escape_filter_path() {
        let path = Path::new("/tmp/my clip's:subs.ass");
        assert_eq!(escape_filter_path(path), "/tmp/my clip\\'s\\:subs.ass");
    }

    #[test]
    fn test_subtitle_filter_is_escaped_not_quoted() {
        let filter = build_subtitle_filter(Path::new("/tmp/a:b.ass"));
        assert_eq!(filter, "[0:v]ass=/tmp/a\\:b.ass[vout];");
        assert!(!filter.contains('\''));
    }
}
