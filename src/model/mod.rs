pub mod project;
pub mod segment;
pub mod timeline;
pub mod video;

pub use project::Project;
pub use segment::Segment;
pub use timeline::Timeline;
pub use video::{Orientation, Video};
