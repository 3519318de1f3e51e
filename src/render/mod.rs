pub mod combine;
pub mod concat;
pub mod music;
pub mod segment;

pub use combine::{check_compatibility, CombinePlan, VideoCombiner};
pub use concat::{build_plan, PlanPiece, Sequencer};
pub use music::MusicMixer;
pub use segment::{plan_segment_window, SegmentRenderer, SegmentWindow};

use std::path::PathBuf;

/// One rendered narrated clip, with the source-video window it covers.
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub segment_name: String,
    pub path: PathBuf,
    /// Start of the covered window on the source video, seconds.
    pub source_start: f64,
    /// End of the covered window, after any audio-fit extension.
    pub source_end: f64,
    /// The segment's authored end time. Gaps resume from here, so an
    /// extended clip lengthens the output instead of eating the
    /// following gap.
    pub authored_end: f64,
}

impl RenderedClip {
    pub fn duration(&self) -> f64 {
        self.source_end - self.source_start
    }
}
