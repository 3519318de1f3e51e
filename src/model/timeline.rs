use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Segment;
use crate::error::{ExportError, Result};

/// An ordered, non-overlapping set of segments over one video.
///
/// Segments are kept sorted by start time. Insertions and updates are
/// rejected rather than silently adjusted when they would overlap a
/// neighbour or fall outside the video.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    /// Duration of the video this timeline annotates, seconds.
    pub video_duration: f64,
    #[serde(default)]
    segments: Vec<Segment>,
}

impl Timeline {
    pub fn new(video_duration: f64) -> Self {
        Self {
            video_duration,
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Add a segment, keeping the list sorted by start time.
    pub fn add_segment(&mut self, segment: Segment) -> Result<()> {
        segment.validate()?;
        self.check_fits(&segment, None)?;

        let position = self
            .segments
            .partition_point(|s| s.start_time < segment.start_time);
        self.segments.insert(position, segment);
        Ok(())
    }

    pub fn remove_segment(&mut self, id: Uuid) -> Result<Segment> {
        let position = self
            .segments
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| ExportError::Validation(format!("No segment with id {id}")))?;
        Ok(self.segments.remove(position))
    }

    /// Replace a segment in place. The update is validated against the
    /// other segments before anything changes.
    pub fn update_segment(&mut self, updated: Segment) -> Result<()> {
        updated.validate()?;
        self.check_fits(&updated, Some(updated.id))?;

        let position = self
            .segments
            .iter()
            .position(|s| s.id == updated.id)
            .ok_or_else(|| ExportError::Validation(format!("No segment with id {}", updated.id)))?;
        self.segments.remove(position);

        let insert_at = self
            .segments
            .partition_point(|s| s.start_time < updated.start_time);
        self.segments.insert(insert_at, updated);
        Ok(())
    }

    /// The segment whose range contains the given time, if any.
    pub fn get_segment_at_time(&self, time: f64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.start_time <= time && time < s.end_time)
    }

    /// Fraction of the video covered by segments, 0.0..=1.0.
    pub fn coverage(&self) -> f64 {
        if self.video_duration <= 0.0 {
            return 0.0;
        }
        let covered: f64 = self.segments.iter().map(Segment::duration).sum();
        (covered / self.video_duration).min(1.0)
    }

    /// Validate the whole timeline: each segment individually, plus the
    /// ordering and non-overlap invariants across them.
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(ExportError::Validation(
                "Timeline has no segments".to_string(),
            ));
        }
        for segment in &self.segments {
            segment.validate()?;
            if segment.end_time > self.video_duration + 0.001 {
                return Err(ExportError::Validation(format!(
                    "Segment '{}' ends at {:.2}s, past the video end ({:.2}s)",
                    segment.name, segment.end_time, self.video_duration
                )));
            }
        }
        for pair in self.segments.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(ExportError::Validation(format!(
                    "Segments '{}' and '{}' overlap",
                    pair[0].name, pair[1].name
                )));
            }
        }
        Ok(())
    }

    fn check_fits(&self, segment: &Segment, ignore_id: Option<Uuid>) -> Result<()> {
        if segment.end_time > self.video_duration + 0.001 {
            return Err(ExportError::Validation(format!(
                "Segment '{}' ends at {:.2}s, past the video end ({:.2}s)",
                segment.name, segment.end_time, self.video_duration
            )));
        }
        for existing in &self.segments {
            if Some(existing.id) == ignore_id {
                continue;
            }
            if existing.overlaps(segment) {
                return Err(ExportError::Validation(format!(
                    "Segment '{}' overlaps existing segment '{}'",
                    segment.name, existing.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, start: f64, end: f64) -> Segment {
        Segment::new(name, start, end, "narration", "en")
    }

    #[test]
    fn test_add_keeps_segments_sorted() {
        let mut timeline = Timeline::new(60.0);
        timeline.add_segment(segment("B", 20.0, 30.0)).unwrap();
        timeline.add_segment(segment("A", 0.0, 10.0)).unwrap();
        timeline.add_segment(segment("C", 40.0, 50.0)).unwrap();

        let names: Vec<_> = timeline.segments().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[test]
    fn test_add_rejects_overlap() {
        let mut timeline = Timeline::new(60.0);
        timeline.add_segment(segment("A", 0.0, 10.0)).unwrap();
        assert!(timeline.add_segment(segment("B", 5.0, 15.0)).is_err());
        // Touching is fine
        assert!(timeline.add_segment(segment("C", 10.0, 15.0)).is_ok());
    }

    #[test]
    fn test_add_rejects_past_video_end() {
        let mut timeline = Timeline::new(30.0);
        assert!(timeline.add_segment(segment("A", 25.0, 35.0)).is_err());
    }

    #[test]
    fn test_update_can_move_within_own_slot() {
        let mut timeline = Timeline::new(60.0);
        let mut s = segment("A", 0.0, 10.0);
        timeline.add_segment(s.clone()).unwrap();
        timeline.add_segment(segment("B", 20.0, 30.0)).unwrap();

        // Extending into its own old range is not a self-overlap
        s.end_time = 15.0;
        timeline.update_segment(s.clone()).unwrap();
        assert_eq!(timeline.get_segment_at_time(12.0).unwrap().name, "A");

        // But colliding with a neighbour is rejected
        s.end_time = 25.0;
        assert!(timeline.update_segment(s).is_err());
    }

    #[test]
    fn test_remove_segment() {
        let mut timeline = Timeline::new(60.0);
        let s = segment("A", 0.0, 10.0);
        let id = s.id;
        timeline.add_segment(s).unwrap();

        assert_eq!(timeline.remove_segment(id).unwrap().name, "A");
        assert!(timeline.is_empty());
        assert!(timeline.remove_segment(id).is_err());
    }

    #[test]
    fn test_get_segment_at_time_bounds() {
        let mut timeline = Timeline::new(60.0);
        timeline.add_segment(segment("A", 10.0, 20.0)).unwrap();

        assert!(timeline.get_segment_at_time(9.9).is_none());
        assert_eq!(timeline.get_segment_at_time(10.0).unwrap().name, "A");
        assert_eq!(timeline.get_segment_at_time(19.9).unwrap().name, "A");
        // End is exclusive
        assert!(timeline.get_segment_at_time(20.0).is_none());
    }

    #[test]
    fn test_coverage() {
        let mut timeline = Timeline::new(100.0);
        timeline.add_segment(segment("A", 0.0, 25.0)).unwrap();
        timeline.add_segment(segment("B", 50.0, 75.0)).unwrap();
        assert!((timeline.coverage() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_validate_empty_timeline() {
        let timeline = Timeline::new(60.0);
        assert!(timeline.validate().is_err());
    }
}
