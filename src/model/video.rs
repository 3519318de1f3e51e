use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::Timeline;
use crate::error::Result;
use crate::ffmpeg::{Ffmpeg, VideoStreamInfo};

/// Coarse shape classification used for concatenation compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    /// Classify by aspect ratio with a dead zone around 1.0 so slightly
    /// off-square footage is still treated as square.
    pub fn from_aspect_ratio(ratio: f64) -> Self {
        if ratio > 1.1 {
            Orientation::Landscape
        } else if ratio < 0.9 {
            Orientation::Portrait
        } else {
            Orientation::Square
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Square => write!(f, "square"),
        }
    }
}

/// One source video plus its annotation timeline and probed stream facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub path: PathBuf,
    pub duration: f64,
    pub info: VideoStreamInfo,
    pub timeline: Timeline,
}

impl Video {
    /// Probe the file and build a video with an empty timeline.
    pub fn probe(ffmpeg: &Ffmpeg, path: PathBuf) -> Result<Self> {
        let duration = ffmpeg.media_duration(&path)?;
        let info = ffmpeg.video_info(&path)?;
        Ok(Self {
            path,
            duration,
            info,
            timeline: Timeline::new(duration),
        })
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.info.height == 0 {
            return 0.0;
        }
        self.info.width as f64 / self.info.height as f64
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_aspect_ratio(self.aspect_ratio())
    }

    /// Whether this video can be joined with another without re-encoding
    /// concerns beyond resolution normalization. Orientation must match;
    /// aspect ratios may differ by up to 5%.
    pub fn is_compatible_with(&self, other: &Video) -> bool {
        if self.orientation() != other.orientation() {
            return false;
        }
        let a = self.aspect_ratio();
        let b = other.aspect_ratio();
        if a == 0.0 || b == 0.0 {
            return false;
        }
        (a - b).abs() / a.max(b) <= 0.05
    }
}
