use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::concat::write_concat_list;
use crate::config::{QualityPreset, Settings};
use crate::error::{ExportError, Result};
use crate::ffmpeg::{Ffmpeg, VideoStreamInfo};
use crate::model::Video;

/// How a set of videos can be joined into one output.
#[derive(Debug, Clone)]
pub struct CombinePlan {
    /// Target stream parameters (the first video's).
    pub target: VideoStreamInfo,
    /// True when the videos differ in resolution or frame rate and must
    /// be normalized before joining.
    pub needs_normalization: bool,
    pub warnings: Vec<String>,
}

/// Decide whether the videos can be combined.
///
/// Mixed orientations are a hard error; resolution and frame rate
/// differences only force a normalizing re-encode and are reported as
/// warnings.
pub fn check_compatibility(videos: &[Video]) -> Result<CombinePlan> {
    let first = videos.first().ok_or_else(|| {
        ExportError::Validation("No videos to combine".to_string())
    })?;

    let mut warnings = Vec::new();
    let mut needs_normalization = false;

    for video in &videos[1..] {
        if video.orientation() != first.orientation() {
            return Err(ExportError::Compatibility(format!(
                "Cannot combine {} video '{}' with {} video '{}'",
                video.orientation(),
                video.path.display(),
                first.orientation(),
                first.path.display(),
            )));
        }
        if video.info.width != first.info.width || video.info.height != first.info.height {
            warnings.push(format!(
                "'{}' is {}x{}, will be scaled to {}x{}",
                video.path.display(),
                video.info.width,
                video.info.height,
                first.info.width,
                first.info.height,
            ));
            needs_normalization = true;
        }
        if (video.info.fps - first.info.fps).abs() > 0.01 {
            warnings.push(format!(
                "'{}' runs at {:.2}fps, will be resampled to {:.2}fps",
                video.path.display(),
                video.info.fps,
                first.info.fps,
            ));
            needs_normalization = true;
        }
    }

    Ok(CombinePlan {
        target: first.info.clone(),
        needs_normalization,
        warnings,
    })
}

/// Scale-and-pad filter that fits a frame into the target resolution
/// without distorting it.
pub fn build_normalize_filter(target: &VideoStreamInfo) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps:.2}",
        w = target.width,
        h = target.height,
        fps = target.fps,
    )
}

/// Joins several exported videos into a single output file.
pub struct VideoCombiner {
    ffmpeg: Ffmpeg,
    settings: Settings,
    quality: QualityPreset,
}

impl VideoCombiner {
    pub fn new(ffmpeg: Ffmpeg, settings: Settings, quality: QualityPreset) -> Self {
        Self {
            ffmpeg,
            settings,
            quality,
        }
    }

    /// Combine the exported videos, in project order, into `output`.
    /// `exported` holds the per-video export results, parallel to
    /// `videos`.
    pub fn combine(
        &self,
        videos: &[Video],
        exported: &[PathBuf],
        work_dir: &Path,
        output: &Path,
    ) -> Result<()> {
        let plan = check_compatibility(videos)?;
        for warning in &plan.warnings {
            warn!("{warning}");
        }

        let inputs = if plan.needs_normalization {
            info!("Normalizing {} videos before joining", exported.len());
            let mut normalized = Vec::with_capacity(exported.len());
            for (i, path) in exported.iter().enumerate() {
                normalized.push(self.normalize(path, &plan.target, work_dir, i)?);
            }
            normalized
        } else {
            exported.to_vec()
        };

        let list_path = work_dir.join("combine.txt");
        write_concat_list(&inputs, &list_path)?;

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
            "combine videos",
        )?;

        if !output.exists() {
            return Err(ExportError::Concatenation(
                "Combined output was not created".to_string(),
            ));
        }
        Ok(())
    }

    fn normalize(
        &self,
        input: &Path,
        target: &VideoStreamInfo,
        work_dir: &Path,
        index: usize,
    ) -> Result<PathBuf> {
        let output = work_dir.join(format!("normalized_{index:02}.mp4"));
        let filter = build_normalize_filter(target);
        let crf_arg = self.quality.crf().to_string();

        self.ffmpeg.run(
            &[
                "-i",
                &input.to_string_lossy(),
                "-vf",
                &filter,
                "-c:v",
                &self.settings.video_codec,
                "-crf",
                &crf_arg,
                "-preset",
                self.quality.encoder_preset(),
                "-c:a",
                &self.settings.audio_codec,
                "-y",
                &output.to_string_lossy(),
            ],
            &format!("normalize {}", input.display()),
        )?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timeline;

    fn video(width: u32, height: u32, fps: f64) -> Video {
        Video {
            path: PathBuf::from(format!("{width}x{height}.mp4")),
            duration: 60.0,
            info: VideoStreamInfo {
                width,
                height,
                fps,
                codec: "h264".to_string(),
                pix_fmt: "yuv420p".to_string(),
            },
            timeline: Timeline::new(60.0),
        }
    }

    #[test]
    fn test_identical_videos_need_no_normalization() {
        let plan =
            check_compatibility(&[video(1920, 1080, 30.0), video(1920, 1080, 30.0)]).unwrap();
        assert!(!plan.needs_normalization);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_resolution_difference_warns_and_normalizes() {
        let plan = check_compatibility(&[video(1920, 1080, 30.0), video(1280, 720, 30.0)]).unwrap();
        assert!(plan.needs_normalization);
        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.target.width, 1920);
    }

    #[test]
    fn test_fps_difference_warns() {
        let plan = check_compatibility(&[video(1920, 1080, 30.0), video(1920, 1080, 24.0)]).unwrap();
        assert!(plan.needs_normalization);
        assert!(plan.warnings[0].contains("24.00fps"));
    }

    #[test]
    fn test_mixed_orientation_is_fatal() {
        let result = check_compatibility(&[video(1920, 1080, 30.0), video(1080, 1920, 30.0)]);
        assert!(matches!(result, Err(ExportError::Compatibility(_))));
    }

    #[test]
    fn test_normalize_filter_shape() {
        let filter = build_normalize_filter(&VideoStreamInfo {
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            pix_fmt: "yuv420p".to_string(),
        });
        assert!(filter.contains("scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(filter.contains("pad=1920:1080:(ow-iw)/2:(oh-ih)/2"));
        assert!(filter.contains("fps=30.00"));
    }
}
