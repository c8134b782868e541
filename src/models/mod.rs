//! Data models for panharvest.

mod annotation;
mod candidate;
mod detection;
mod mask;

pub use annotation::{ImageAnnotation, SegmentInfo};
pub use candidate::{CategoryLabel, ImageCandidate, SearchHit};
pub use detection::Detection;
pub use mask::BitMask;
