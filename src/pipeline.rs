use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ExportOptions, Settings};
use crate::error::{ExportError, Result};
use crate::ffmpeg::Ffmpeg;
use crate::fonts::FontProvider;
use crate::model::{Project, Segment, Video};
use crate::render::{MusicMixer, RenderedClip, SegmentRenderer, Sequencer, VideoCombiner};
use crate::tts::{GeneratedSpeech, SpeechGenerator};

/// Stages of one export run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Validating,
    GeneratingSpeech,
    Rendering,
    Sequencing,
    Combining,
    MixingMusic,
    Done,
    Failed,
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStage::Validating => write!(f, "Validating"),
            ExportStage::GeneratingSpeech => write!(f, "Generating speech"),
            ExportStage::Rendering => write!(f, "Rendering segments"),
            ExportStage::Sequencing => write!(f, "Sequencing"),
            ExportStage::Combining => write!(f, "Combining videos"),
            ExportStage::MixingMusic => write!(f, "Mixing music"),
            ExportStage::Done => write!(f, "Done"),
            ExportStage::Failed => write!(f, "Failed"),
        }
    }
}

/// Observer for stage transitions. The fraction is overall progress for
/// the current stage, 0.0..=1.0.
pub type ProgressFn = dyn Fn(ExportStage, f32) + Send + Sync;

/// Summary of one export run.
#[derive(Debug, Clone, Default)]
pub struct ExportStats {
    pub segments_total: usize,
    pub segments_cached: usize,
    pub segments_generated: usize,
    pub clips_rendered: usize,
    pub videos_exported: usize,
    pub elapsed: Duration,
}

/// Drives a project export end to end: speech generation, per-segment
/// rendering, sequencing, optional music, final move into place.
///
/// All intermediate files live in a temp directory that is removed on
/// every exit path; the output path is only ever touched by the final
/// atomic move.
pub struct ExportOrchestrator {
    generator: Arc<SpeechGenerator>,
    fonts: Arc<dyn FontProvider>,
    ffmpeg: Ffmpeg,
    settings: Settings,
    show_progress: bool,
    cancelled: Arc<AtomicBool>,
    on_progress: Option<Box<ProgressFn>>,
}

impl ExportOrchestrator {
    pub fn new(
        generator: Arc<SpeechGenerator>,
        fonts: Arc<dyn FontProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            generator,
            fonts,
            ffmpeg: Ffmpeg::new(&settings),
            settings,
            show_progress: false,
            cancelled: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_progress_bars(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(ExportStage, f32) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Shared flag observed between units of work. Setting it makes the
    /// export stop at the next checkpoint with `ExportError::Cancelled`.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Export the whole project to `output_path`.
    ///
    /// Re-running with unchanged segments is cheap: every narration is
    /// served from the cache and no network calls are made.
    pub async fn export(
        &self,
        project: &Project,
        options: &ExportOptions,
        output_path: &Path,
    ) -> Result<ExportStats> {
        let result = self.run(project, options, output_path).await;
        if result.is_err() {
            self.report(ExportStage::Failed, 1.0);
        }
        result
    }

    async fn run(
        &self,
        project: &Project,
        options: &ExportOptions,
        output_path: &Path,
    ) -> Result<ExportStats> {
        let started = Instant::now();
        let mut stats = ExportStats::default();

        self.report(ExportStage::Validating, 0.0);
        self.check_cancelled()?;
        self.settings.validate()?;
        project.validate()?;
        if options.include_subtitles {
            self.check_fonts(project)?;
        }
        self.ffmpeg.check_ffmpeg()?;
        self.ffmpeg.check_ffprobe()?;
        self.report(ExportStage::Validating, 1.0);

        // All intermediates live here; dropped (and deleted) on any exit
        let work_dir = tempfile::Builder::new().prefix("voxover-export-").tempdir()?;

        let segments: Vec<Segment> = project
            .videos
            .iter()
            .flat_map(|v| v.timeline.segments().iter().cloned())
            .collect();
        stats.segments_total = segments.len();

        self.report(ExportStage::GeneratingSpeech, 0.0);
        let speech = self.generate_speech(&segments, &mut stats).await?;

        let mut exported = Vec::with_capacity(project.videos.len());
        for video in &project.videos {
            let sequenced = self
                .export_video(video, options, &speech, work_dir.path(), &mut stats)
                .await?;
            exported.push(sequenced);
            stats.videos_exported += 1;
        }

        let mut current = if exported.len() > 1 {
            self.report(ExportStage::Combining, 0.0);
            let combined = work_dir.path().join("combined.mp4");
            let combiner =
                VideoCombiner::new(self.ffmpeg.clone(), self.settings.clone(), options.quality);
            combiner.combine(&project.videos, &exported, work_dir.path(), &combined)?;
            self.check_cancelled()?;
            self.report(ExportStage::Combining, 1.0);
            combined
        } else {
            exported.remove(0)
        };

        if let Some(music) = &options.background_music {
            self.report(ExportStage::MixingMusic, 0.0);
            let with_music = work_dir.path().join("with_music.mp4");
            let mixer = MusicMixer::new(self.ffmpeg.clone(), self.settings.clone());
            mixer.mix(&current, music, &with_music)?;
            self.check_cancelled()?;
            self.report(ExportStage::MixingMusic, 1.0);
            current = with_music;
        }

        move_into_place(&current, output_path)?;
        stats.elapsed = started.elapsed();

        info!(
            "Exported '{}' to {} in {:.1}s ({} segments, {} cached)",
            project.name,
            output_path.display(),
            stats.elapsed.as_secs_f64(),
            stats.segments_total,
            stats.segments_cached,
        );
        self.report(ExportStage::Done, 1.0);
        Ok(stats)
    }

    /// Generate narration for every segment, bounded by the concurrency
    /// cap with a fixed delay between dispatches. Cached segments cost
    /// nothing.
    async fn generate_speech(
        &self,
        segments: &[Segment],
        stats: &mut ExportStats,
    ) -> Result<HashMap<Uuid, GeneratedSpeech>> {
        let bar = self.stage_bar(segments.len() as u64, "speech");
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_tts));
        let mut futures = FuturesUnordered::new();

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.tts_dispatch_delay_ms))
                    .await;
            }
            self.check_cancelled()?;

            let generator = self.generator.clone();
            let semaphore = semaphore.clone();
            let segment = segment.clone();
            futures.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ExportError::Cancelled)?;
                let speech = generator.generate(&segment).await?;
                Ok::<_, ExportError>((segment.id, speech))
            }));
        }

        let mut speech = HashMap::with_capacity(segments.len());
        let mut done = 0usize;
        while let Some(joined) = futures.next().await {
            let (id, generated) = joined
                .map_err(|e| ExportError::Generation(format!("Generation task failed: {e}")))??;
            if generated.cached {
                stats.segments_cached += 1;
            } else {
                stats.segments_generated += 1;
            }
            speech.insert(id, generated);

            done += 1;
            bar.inc(1);
            self.report(
                ExportStage::GeneratingSpeech,
                done as f32 / segments.len().max(1) as f32,
            );
            self.check_cancelled()?;
        }
        bar.finish_and_clear();
        Ok(speech)
    }

    /// Render and sequence one video into a full-length narrated file.
    async fn export_video(
        &self,
        video: &Video,
        options: &ExportOptions,
        speech: &HashMap<Uuid, GeneratedSpeech>,
        work_dir: &Path,
        stats: &mut ExportStats,
    ) -> Result<PathBuf> {
        let segments = video.timeline.segments();
        let renderer =
            SegmentRenderer::new(self.ffmpeg.clone(), self.settings.clone(), options.quality);

        self.report(ExportStage::Rendering, 0.0);
        let bar = self.stage_bar(segments.len() as u64, "render");
        let mut clips: Vec<RenderedClip> = Vec::with_capacity(segments.len());

        for (i, segment) in segments.iter().enumerate() {
            self.check_cancelled()?;

            let generated = speech.get(&segment.id).ok_or_else(|| {
                ExportError::Generation(format!(
                    "No generated speech for segment '{}'",
                    segment.name
                ))
            })?;
            let next_start = segments.get(i + 1).map(|s| s.start_time);

            let clip = renderer.render(
                &video.path,
                segment,
                &generated.audio_path,
                generated.subtitle_path.as_deref(),
                next_start,
                options.include_subtitles,
                work_dir,
            )?;
            if clip.source_end > video.duration {
                warn!(
                    "Segment '{}' narration runs {:.2}s past the end of the source video",
                    segment.name,
                    clip.source_end - video.duration
                );
            }
            clips.push(clip);
            stats.clips_rendered += 1;

            bar.inc(1);
            self.report(
                ExportStage::Rendering,
                (i + 1) as f32 / segments.len().max(1) as f32,
            );
        }
        bar.finish_and_clear();

        self.report(ExportStage::Sequencing, 0.0);
        let sequenced = work_dir.join(format!("sequenced_{}.mp4", stats.videos_exported));
        let sequencer =
            Sequencer::new(self.ffmpeg.clone(), self.settings.clone(), options.quality);
        sequencer.sequence(&video.path, video.duration, &clips, work_dir, &sequenced)?;
        self.check_cancelled()?;
        self.report(ExportStage::Sequencing, 1.0);

        Ok(sequenced)
    }

    /// Every distinct effective font must be usable before any rendering
    /// starts; failing midway would waste completed work.
    fn check_fonts(&self, project: &Project) -> Result<()> {
        let mut checked = std::collections::HashSet::new();
        for video in &project.videos {
            for segment in video.timeline.segments() {
                if !segment.subtitle_enabled {
                    continue;
                }
                let font = segment.style.effective_font(&segment.language);
                if checked.insert(font.clone()) {
                    self.fonts.ensure_available(&font)?;
                }
            }
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            warn!("Export cancelled");
            return Err(ExportError::Cancelled);
        }
        Ok(())
    }

    fn report(&self, stage: ExportStage, fraction: f32) {
        if let Some(callback) = &self.on_progress {
            callback(stage, fraction);
        }
    }

    fn stage_bar(&self, len: u64, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:30.cyan/blue}] {pos}/{len} ({elapsed})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.set_message(label.to_string());
        bar
    }
}

/// Move the finished file onto the output path. Rename is atomic on the
/// same filesystem; across filesystems, copy to a staging sibling first
/// and rename that, so the output path never holds a partial file.
fn move_into_place(finished: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    match std::fs::rename(finished, output) {
        Ok(()) => Ok(()),
        Err(_) => {
            let staged_name = output
                .file_name()
                .map(|n| format!(".{}.part", n.to_string_lossy()))
                .unwrap_or_else(|| ".voxover.part".to_string());
            let staged = output.with_file_name(staged_name);

            if let Err(e) = std::fs::copy(finished, &staged) {
                let _ = std::fs::remove_file(&staged);
                return Err(e.into());
            }
            std::fs::rename(&staged, output)?;
            std::fs::remove_file(finished)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(ExportStage::GeneratingSpeech.to_string(), "Generating speech");
        assert_eq!(ExportStage::Done.to_string(), "Done");
    }

    #[test]
    fn test_move_into_place_renames() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("finished.mp4");
        let dst = dir.path().join("out/final.mp4");
        std::fs::write(&src, b"video").unwrap();

        move_into_place(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"video");
    }
}
