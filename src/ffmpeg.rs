use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{ExportError, Result};

/// Probed metadata for the first video stream of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub pix_fmt: String,
}

/// Thin wrapper around the external processing binaries.
///
/// All invocations are synchronous child-process calls; callers capture
/// stderr through the returned errors for diagnostics.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Ffmpeg {
    pub fn new(settings: &Settings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg_path.clone(),
            ffprobe: settings.ffprobe_path.clone(),
        }
    }

    /// Check that FFmpeg is installed and accessible.
    pub fn check_ffmpeg(&self) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map_err(|e| {
                ExportError::Render(format!(
                    "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
                ))
            })?;

        if !output.status.success() {
            return Err(ExportError::Render("FFmpeg check failed".to_string()));
        }

        debug!("FFmpeg is available");
        Ok(())
    }

    /// Check that FFprobe is installed and accessible.
    pub fn check_ffprobe(&self) -> Result<()> {
        let output = Command::new(&self.ffprobe)
            .arg("-version")
            .output()
            .map_err(|e| {
                ExportError::Render(format!(
                    "FFprobe not found. Please install FFmpeg (includes FFprobe). Error: {e}"
                ))
            })?;

        if !output.status.success() {
            return Err(ExportError::Render("FFprobe check failed".to_string()));
        }

        debug!("FFprobe is available");
        Ok(())
    }

    /// Get media file duration in seconds.
    pub fn media_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .output()
            .map_err(|e| ExportError::Render(format!("Failed to run FFprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Render(format!(
                "FFprobe failed for {}: {stderr}",
                input.display()
            )));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str.trim().parse().map_err(|e| {
            ExportError::Render(format!(
                "Failed to parse duration '{}': {e}",
                duration_str.trim()
            ))
        })
    }

    /// Check if a media file carries an audio stream.
    pub fn has_audio_stream(&self, input: &Path) -> bool {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "a",
                "-show_entries",
                "stream=codec_type",
                "-of",
                "csv=p=0",
            ])
            .arg(input)
            .output();

        match output {
            Ok(o) => o.status.success() && String::from_utf8_lossy(&o.stdout).contains("audio"),
            Err(e) => {
                warn!("Could not determine audio stream info: {e}");
                false
            }
        }
    }

    /// Probe resolution, codec, pixel format and frame rate of the first
    /// video stream.
    pub fn video_info(&self, input: &Path) -> Result<VideoStreamInfo> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,pix_fmt,codec_name,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(input)
            .output()
            .map_err(|e| ExportError::Render(format!("Failed to run FFprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Render(format!(
                "FFprobe failed for {}: {stderr}",
                input.display()
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = parsed.streams.into_iter().next().ok_or_else(|| {
            ExportError::Render(format!("No video stream found in {}", input.display()))
        })?;

        let info = VideoStreamInfo {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps: parse_frame_rate(stream.r_frame_rate.as_deref()),
            codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
            pix_fmt: stream.pix_fmt.unwrap_or_else(|| "yuv420p".to_string()),
        };

        debug!(
            "Video info: {}x{}, {}, {}, {:.2}fps",
            info.width, info.height, info.codec, info.pix_fmt, info.fps
        );
        Ok(info)
    }

    /// Run an FFmpeg command, mapping a nonzero exit to a render error
    /// that carries the captured stderr.
    pub fn run(&self, args: &[&str], context: &str) -> Result<()> {
        debug!("ffmpeg {}", args.join(" "));

        let output = Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .map_err(|e| ExportError::Render(format!("Failed to run FFmpeg ({context}): {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Render(format!("{context}: {}", stderr.trim())));
        }

        Ok(())
    }

}

fn parse_frame_rate(rate: Option<&str>) -> f64 {
    let Some(rate) = rate else { return 30.0 };

    if let Some((num, den)) = rate.split_once('/') {
        match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 30.0,
        }
    } else {
        rate.parse().unwrap_or(30.0)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    codec_name: Option<String>,
    r_frame_rate: Option<String>,
}
