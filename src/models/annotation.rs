//! COCO-style panoptic annotation records.

use serde::{Deserialize, Serialize};

/// Metadata for one surviving instance within an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Instance id, unique and positive within one image.
    pub id: u32,
    pub category_id: u32,
    /// Pixel bounding box as `[x0, y0, x1, y1]`.
    pub bbox: [i32; 4],
    pub iscrowd: u8,
    pub area: i64,
}

impl SegmentInfo {
    /// Build a segment record from a detection; `area` is the bbox area.
    pub fn from_bbox(id: u32, category_id: u32, bbox: [i32; 4]) -> Self {
        let area = i64::from(bbox[2] - bbox[0]) * i64::from(bbox[3] - bbox[1]);
        Self {
            id,
            category_id,
            bbox,
            iscrowd: 0,
            area,
        }
    }
}

/// Panoptic annotation for a single image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    /// Run-global id, strictly increasing in annotation order.
    pub image_id: u32,
    pub file_name: String,
    pub segments_info: Vec<SegmentInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_is_bbox_area() {
        let segment = SegmentInfo::from_bbox(3, 1, [10, 20, 30, 50]);
        assert_eq!(segment.area, 600);
        assert_eq!(segment.iscrowd, 0);
    }

    #[test]
    fn test_record_uses_coco_field_names() {
        let annotation = ImageAnnotation {
            image_id: 7,
            file_name: "cat.jpg".to_string(),
            segments_info: vec![SegmentInfo::from_bbox(1, 0, [0, 0, 2, 2])],
        };
        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["image_id"], 7);
        assert_eq!(json["file_name"], "cat.jpg");
        assert_eq!(json["segments_info"][0]["category_id"], 0);
        assert_eq!(json["segments_info"][0]["iscrowd"], 0);
        assert_eq!(json["segments_info"][0]["bbox"][2], 2);
    }
}
