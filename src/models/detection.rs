//! Oracle detections awaiting fusion.

use super::BitMask;

/// One instance returned by the oracle for an (image, label) query.
#[derive(Debug, Clone)]
pub struct Detection {
    pub mask: BitMask,
    /// Pixel bounding box as `[x0, y0, x1, y1]`.
    pub bbox: [i32; 4],
    /// Id of the category label that prompted this detection.
    pub category_id: u32,
    pub score: f32,
    /// Phrase the oracle matched against the label prompt.
    pub phrase: String,
}
