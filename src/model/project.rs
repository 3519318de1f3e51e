use serde::{Deserialize, Serialize};

use super::Video;
use crate::error::{ExportError, Result};

/// A named, ordered collection of videos exported as one output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub videos: Vec<Video>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            videos: Vec::new(),
        }
    }

    pub fn add_video(&mut self, video: Video) {
        self.videos.push(video);
    }

    /// Total number of segments across all videos.
    pub fn segment_count(&self) -> usize {
        self.videos.iter().map(|v| v.timeline.len()).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ExportError::Validation(
                "Project name cannot be empty".to_string(),
            ));
        }
        if self.videos.is_empty() {
            return Err(ExportError::Validation(
                "Project has no videos".to_string(),
            ));
        }
        for video in &self.videos {
            video.timeline.validate()?;
        }
        Ok(())
    }
}
