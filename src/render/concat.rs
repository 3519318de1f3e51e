use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::RenderedClip;
use crate::config::{QualityPreset, Settings};
use crate::error::{ExportError, Result};
use crate::ffmpeg::Ffmpeg;

/// Pieces below this length are dropped rather than extracted; they come
/// from floating point drift, not authored gaps.
const MIN_GAP_SECS: f64 = 0.05;

/// One piece of the final timeline, in playback order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanPiece {
    /// Index into the rendered clip list.
    Clip(usize),
    /// Unnarrated stretch of the source video, seconds.
    Gap { start: f64, end: f64 },
}

impl PlanPiece {
    pub fn duration(&self, clips: &[RenderedClip]) -> f64 {
        match self {
            PlanPiece::Clip(i) => clips[*i].duration(),
            PlanPiece::Gap { start, end } => end - start,
        }
    }
}

/// Interleave rendered clips with the source-video gaps between them.
///
/// Clips must be sorted by source start. Gaps are measured between
/// authored segment boundaries, so a clip extended to fit its narration
/// lengthens the output rather than shortening the following gap; the
/// footage it overlaps with is logged and plays again in that gap.
pub fn build_plan(video_duration: f64, clips: &[RenderedClip]) -> Vec<PlanPiece> {
    let mut pieces = Vec::new();
    let mut cursor = 0.0_f64;

    for (i, clip) in clips.iter().enumerate() {
        if clip.source_start > cursor + MIN_GAP_SECS {
            pieces.push(PlanPiece::Gap {
                start: cursor,
                end: clip.source_start,
            });
        }
        if clip.source_end > clip.authored_end + MIN_GAP_SECS {
            warn!(
                "Clip '{}' repeats {:.2}s of source footage after its authored end",
                clip.segment_name,
                clip.source_end - clip.authored_end
            );
        }
        pieces.push(PlanPiece::Clip(i));
        cursor = clip.authored_end.max(clip.source_start);
    }

    if cursor + MIN_GAP_SECS < video_duration {
        pieces.push(PlanPiece::Gap {
            start: cursor,
            end: video_duration,
        });
    }

    pieces
}

/// Write a concat demuxer list file.
pub fn write_concat_list(paths: &[PathBuf], list_path: &Path) -> Result<()> {
    let mut contents = String::new();
    for path in paths {
        let escaped = path.to_string_lossy().replace('\'', "'\\''");
        contents.push_str(&format!("file '{escaped}'\n"));
    }
    std::fs::write(list_path, contents)?;
    Ok(())
}

/// Joins rendered clips and source-video gaps into one continuous video.
pub struct Sequencer {
    ffmpeg: Ffmpeg,
    settings: Settings,
    quality: QualityPreset,
}

impl Sequencer {
    pub fn new(ffmpeg: Ffmpeg, settings: Settings, quality: QualityPreset) -> Self {
        Self {
            ffmpeg,
            settings,
            quality,
        }
    }

    /// Assemble the full-length video: every source second appears once,
    /// narrated inside clips and untouched inside gaps.
    pub fn sequence(
        &self,
        source_video: &Path,
        video_duration: f64,
        clips: &[RenderedClip],
        work_dir: &Path,
        output: &Path,
    ) -> Result<()> {
        let plan = build_plan(video_duration, clips);
        info!(
            "Sequencing {} clips and {} gaps",
            clips.len(),
            plan.iter()
                .filter(|p| matches!(p, PlanPiece::Gap { .. }))
                .count()
        );

        let has_audio = self.ffmpeg.has_audio_stream(source_video);
        let mut piece_paths = Vec::with_capacity(plan.len());
        for (i, piece) in plan.iter().enumerate() {
            match piece {
                PlanPiece::Clip(idx) => piece_paths.push(clips[*idx].path.clone()),
                PlanPiece::Gap { start, end } => {
                    let path = self.extract_gap(source_video, *start, *end, has_audio, work_dir, i)?;
                    piece_paths.push(path);
                }
            }
        }

        self.check_consistency(&piece_paths)?;

        let list_path = work_dir.join("sequence.txt");
        write_concat_list(&piece_paths, &list_path)?;

        self.ffmpeg.run(
            &[
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                &list_path.to_string_lossy(),
                "-c",
                "copy",
                "-y",
                &output.to_string_lossy(),
            ],
            "join sequence",
        )?;

        if !output.exists() {
            return Err(ExportError::Concatenation(
                "Sequenced output was not created".to_string(),
            ));
        }
        Ok(())
    }

    /// Extract a gap from the source, re-encoded with the same settings
    /// as clips so the final join can stream-copy. Sources without audio
    /// get a silent track to keep the stream layout uniform.
    fn extract_gap(
        &self,
        source_video: &Path,
        start: f64,
        end: f64,
        has_audio: bool,
        work_dir: &Path,
        index: usize,
    ) -> Result<PathBuf> {
        let output = work_dir.join(format!("gap_{index:03}.mp4"));
        let start_arg = format!("{start:.3}");
        let duration_arg = format!("{:.3}", end - start);
        let crf_arg = self.quality.crf().to_string();

        let source_arg = source_video.to_string_lossy().to_string();
        let output_arg = output.to_string_lossy().to_string();

        let mut args: Vec<&str> = vec!["-ss", &start_arg, "-t", &duration_arg, "-i", &source_arg];
        if !has_audio {
            args.extend([
                "-f",
                "lavfi",
                "-t",
                &duration_arg,
                "-i",
                "anullsrc=channel_layout=stereo:sample_rate=44100",
                "-shortest",
            ]);
        }
        args.extend([
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
        ]);

        self.ffmpeg
            .run(&args, &format!("extract gap {start:.2}s..{end:.2}s"))?;
        debug!("Extracted gap {start:.2}s..{end:.2}s");
        Ok(output)
    }

    /// Stream-copy joining requires every piece to agree on codec and
    /// resolution; a mismatch would corrupt the output silently.
    fn check_consistency(&self, pieces: &[PathBuf]) -> Result<()> {
        let mut reference = None;
        for piece in pieces {
            let info = self.ffmpeg.video_info(piece)?;
            match &reference {
                None => reference = Some(info),
                Some(expected) => {
                    if info.codec != expected.codec
                        || info.width != expected.width
                        || info.height != expected.height
                    {
                        return Err(ExportError::Concatenation(format!(
                            "Piece {} is {}x{} {}, expected {}x{} {}",
                            piece.display(),
                            info.width,
                            info.height,
                            info.codec,
                            expected.width,
                            expected.height,
                            expected.codec,
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(name: &str, start: f64, end: f64) -> RenderedClip {
        extended_clip(name, start, end, end)
    }

    fn extended_clip(name: &str, start: f64, end: f64, authored_end: f64) -> RenderedClip {
        RenderedClip {
            segment_name: name.to_string(),
            path: PathBuf::from(format!("{name}.mp4")),
            source_start: start,
            source_end: end,
            authored_end,
        }
    }

    #[test]
    fn test_plan_alternates_clips_and_gaps() {
        // 12s clip, 5s gap, 10s clip, 5s tail over a 32s video
        let clips = vec![clip("a", 0.0, 12.0), clip("b", 17.0, 27.0)];
        let plan = build_plan(32.0, &clips);

        assert_eq!(
            plan,
            vec![
                PlanPiece::Clip(0),
                PlanPiece::Gap {
                    start: 12.0,
                    end: 17.0
                },
                PlanPiece::Clip(1),
                PlanPiece::Gap {
                    start: 27.0,
                    end: 32.0
                },
            ]
        );

        let total: f64 = plan.iter().map(|p| p.duration(&clips)).sum();
        assert!((total - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_leading_gap() {
        let clips = vec![clip("a", 5.0, 10.0)];
        let plan = build_plan(10.0, &clips);
        assert_eq!(
            plan[0],
            PlanPiece::Gap {
                start: 0.0,
                end: 5.0
            }
        );
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_plan_full_coverage_has_no_gaps() {
        let clips = vec![clip("a", 0.0, 15.0), clip("b", 15.0, 30.0)];
        let plan = build_plan(30.0, &clips);
        assert_eq!(plan, vec![PlanPiece::Clip(0), PlanPiece::Clip(1)]);
    }

    #[test]
    fn test_extended_clip_preserves_following_gap() {
        // 10s segment extended to 12s of narration over a 30s video;
        // the 10..15 gap keeps its authored 5s and the output grows to
        // 12+5+10+5 = 32s.
        let clips = vec![
            extended_clip("a", 0.0, 12.0, 10.0),
            extended_clip("b", 15.0, 25.0, 25.0),
        ];
        let plan = build_plan(30.0, &clips);

        assert_eq!(
            plan,
            vec![
                PlanPiece::Clip(0),
                PlanPiece::Gap {
                    start: 10.0,
                    end: 15.0
                },
                PlanPiece::Clip(1),
                PlanPiece::Gap {
                    start: 25.0,
                    end: 30.0
                },
            ]
        );

        let durations: Vec<f64> = plan.iter().map(|p| p.duration(&clips)).collect();
        assert_eq!(durations, vec![12.0, 5.0, 10.0, 5.0]);
        assert!((durations.iter().sum::<f64>() - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_ignores_sub_epsilon_gaps() {
        let clips = vec![clip("a", 0.0, 9.99), clip("b", 10.0, 20.0)];
        let plan = build_plan(20.0, &clips);
        assert_eq!(plan, vec![PlanPiece::Clip(0), PlanPiece::Clip(1)]);
    }

    #[test]
    fn test_write_concat_list_escapes_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        write_concat_list(
            &[PathBuf::from("/tmp/it's.mp4"), PathBuf::from("/tmp/b.mp4")],
            &list,
        )
        .unwrap();

        let contents = std::fs::read_to_string(&list).unwrap();
        assert!(contents.contains("file '/tmp/it'\\''s.mp4'"));
        assert!(contents.contains("file '/tmp/b.mp4'"));
    }
}
