use std::path::Path;

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ExportError, Result};
use crate::ffmpeg::Ffmpeg;

/// Number of whole plays needed so the music never runs out before the
/// video does. Always at least one.
pub fn loop_count(video_duration: f64, music_duration: f64) -> u64 {
    if music_duration <= 0.0 {
        return 1;
    }
    ((video_duration / music_duration).ceil() as u64).max(1)
}

/// Filter chain applied to the music track: loop to cover the video,
/// attenuate, fade out at the end, trim to the exact video length.
pub fn build_music_chain(
    loops: u64,
    reduction_db: u32,
    video_duration: f64,
    fade_duration: f64,
) -> String {
    let fade_start = (video_duration - fade_duration).max(0.0);
    format!(
        "aloop=loop={}:size=2147483647,volume=-{reduction_db}dB,\
         afade=t=out:st={fade_start:.3}:d={fade_duration:.3},atrim=duration={video_duration:.3}",
        loops.saturating_sub(1)
    )
}

/// Full mix graph: the video's audio (narration included) gets the fixed
/// boost, the music track gets the attenuating chain, and the video
/// length governs the mix. Music-only path when the video is silent.
pub fn build_mix_filter(chain: &str, has_video_audio: bool, boost_db: u32) -> String {
    if has_video_audio {
        format!(
            "[0:a]volume={boost_db}dB[boosted];[1:a]{chain}[bgm];\
             [boosted][bgm]amix=inputs=2:duration=first:dropout_transition=0[aout]"
        )
    } else {
        format!("[1:a]{chain}[aout]")
    }
}

/// Mixes looping background music under a finished video's audio.
pub struct MusicMixer {
    ffmpeg: Ffmpeg,
    settings: Settings,
}

impl MusicMixer {
    pub fn new(ffmpeg: Ffmpeg, settings: Settings) -> Self {
        Self { ffmpeg, settings }
    }

    /// Mix `music` under the audio of `video`, writing `output`. The
    /// video stream is copied untouched.
    pub fn mix(&self, video: &Path, music: &Path, output: &Path) -> Result<()> {
        if !music.exists() {
            return Err(ExportError::Validation(format!(
                "Background music file not found: {}",
                music.display()
            )));
        }

        let video_duration = self.ffmpeg.media_duration(video)?;
        let music_duration = self.ffmpeg.media_duration(music)?;
        let loops = loop_count(video_duration, music_duration);
        info!(
            "Mixing background music ({:.1}s track, {} plays over {:.1}s)",
            music_duration, loops, video_duration
        );

        let chain = build_music_chain(
            loops,
            self.settings.bgm_volume_reduction_db,
            video_duration,
            self.settings.fade_duration,
        );

        let filter = build_mix_filter(
            &chain,
            self.ffmpeg.has_audio_stream(video),
            self.settings.tts_volume_boost_db,
        );

        self.ffmpeg.run(
            &[
                "-i",
                &video.to_string_lossy(),
                "-i",
                &music.to_string_lossy(),
                "-filter_complex",
                &filter,
                "-map",
                "0:v",
                "-map",
                "[aout]",
                "-c:v",
                "copy",
                "-c:a",
                &self.settings.audio_codec,
                "-y",
                &output.to_string_lossy(),
            ],
            "mix background music",
        )?;

        debug!("Background music mixed into {}", output.display());
        Ok(())
    }
}
