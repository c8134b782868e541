//! Panoptic composition: per-label oracle queries fused into one instance map.
//!
//! Detections arrive one oracle query per category label and may overlap
//! freely. Fusion resolves them greedily, in gathered order, into a single
//! per-pixel instance canvas with deduplicated segment metadata.

mod canvas;
mod preview;

pub use canvas::{InstanceCanvas, Overlap};

use std::collections::BTreeMap;
use std::fs;

use anyhow::Context;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::models::{CategoryLabel, Detection, ImageAnnotation, ImageCandidate, SegmentInfo};
use crate::oracle::SegmentationOracle;
use crate::pipeline::ImageIdCounter;
use crate::store::AnnotationStore;

/// IoU at or above which two instances are considered duplicates.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.6;

/// Everything produced for one successfully annotated image.
pub struct ComposeOutcome {
    pub annotation: ImageAnnotation,
    pub preview: RgbaImage,
}

/// Result of overlap resolution for one image.
pub struct FusionResult {
    pub canvas: InstanceCanvas,
    /// Surviving segments keyed by instance id.
    pub segments: BTreeMap<u32, SegmentInfo>,
    /// Detection indices rendered in the preview overlay.
    pub valid: Vec<usize>,
}

/// Fuses per-label oracle detections into a panoptic annotation per image.
pub struct PanopticComposer {
    oracle: Box<dyn SegmentationOracle>,
    labels: Vec<CategoryLabel>,
    overlap_threshold: f64,
}

impl PanopticComposer {
    pub fn new(
        oracle: Box<dyn SegmentationOracle>,
        labels: Vec<CategoryLabel>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!labels.is_empty(), "category label list is empty");
        Ok(Self {
            oracle,
            labels,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        })
    }

    pub fn with_overlap_threshold(mut self, threshold: f64) -> Self {
        self.overlap_threshold = threshold;
        self
    }

    /// Annotate one downloaded image.
    ///
    /// Queries the oracle once per configured label, fuses the detections,
    /// persists the label map and intermediate record through `store`, and
    /// bumps `counter` once. Returns `None` when no label matched anything;
    /// the source file is deleted in that case.
    pub async fn generate_annotation(
        &self,
        candidate: &ImageCandidate,
        store: &AnnotationStore,
        counter: &mut ImageIdCounter,
        box_threshold: f32,
        text_threshold: f32,
    ) -> anyhow::Result<Option<ComposeOutcome>> {
        let image = image::open(&candidate.path)
            .with_context(|| format!("cannot decode {}", candidate.path.display()))?;
        let detections = self
            .gather_detections(&image, box_threshold, text_threshold)
            .await;

        if detections.is_empty() {
            info!(
                "no labels matched {}, removing it",
                candidate.path.display()
            );
            fs::remove_file(&candidate.path)
                .with_context(|| format!("cannot delete {}", candidate.path.display()))?;
            return Ok(None);
        }

        let fusion = fuse_detections(
            &detections,
            candidate.width,
            candidate.height,
            self.overlap_threshold,
        );

        let file_name = candidate
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        store.write_canvas(&file_name, &fusion.canvas.to_label_image())?;

        let annotation = ImageAnnotation {
            image_id: counter.next_id(),
            file_name,
            segments_info: fusion.segments.into_values().collect(),
        };
        store.write_intermediate(&annotation)?;

        let preview = preview::render(&image, &detections, &fusion.valid);
        Ok(Some(ComposeOutcome {
            annotation,
            preview,
        }))
    }

    /// Query the oracle once per label, in configured label order.
    async fn gather_detections(
        &self,
        image: &DynamicImage,
        box_threshold: f32,
        text_threshold: f32,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();
        for label in &self.labels {
            match self
                .oracle
                .predict(image, &label.name, box_threshold, text_threshold)
                .await
            {
                Ok(predictions) => {
                    debug!(
                        "{} instances for label {:?}",
                        predictions.len(),
                        label.name
                    );
                    for prediction in predictions {
                        detections.push(Detection {
                            mask: prediction.mask,
                            bbox: prediction.bbox.map(|v| v as i32),
                            category_id: label.id,
                            score: prediction.score,
                            phrase: prediction.phrase,
                        });
                    }
                }
                Err(e) => warn!("oracle query for label {:?} failed: {}", label.name, e),
            }
        }
        detections
    }
}

/// Resolve overlapping detections into a single instance map.
///
/// Detections are processed in gathered order; the i-th one claims id
/// `i + 1`. Evicted ids are never reused within the image. An incumbent is
/// evicted when a later detection overlaps it with IoU at or above
/// `threshold` and the incumbent's painted area is not larger; a later
/// duplicate of a strictly larger incumbent stays visible in the preview
/// but contributes no segment and leaves the canvas untouched.
pub fn fuse_detections(
    detections: &[Detection],
    width: u32,
    height: u32,
    threshold: f64,
) -> FusionResult {
    let mut canvas = InstanceCanvas::new(width, height);
    let mut segments: BTreeMap<u32, SegmentInfo> = BTreeMap::new();
    let mut valid: Vec<usize> = Vec::new();

    for (index, detection) in detections.iter().enumerate() {
        let new_id = (index + 1) as u32;
        match canvas.overlap(&detection.mask) {
            None => accept(&mut canvas, &mut segments, &mut valid, detection, index, new_id),
            Some(overlap) if overlap.iou < threshold => {
                accept(&mut canvas, &mut segments, &mut valid, detection, index, new_id)
            }
            Some(overlap) if overlap.majority_area <= detection.mask.area() => {
                segments.remove(&overlap.majority_id);
                valid.retain(|&seen| seen as u32 + 1 != overlap.majority_id);
                canvas.erase(overlap.majority_id);
                accept(&mut canvas, &mut segments, &mut valid, detection, index, new_id)
            }
            Some(_) => valid.push(index),
        }
    }

    FusionResult {
        canvas,
        segments,
        valid,
    }
}

fn accept(
    canvas: &mut InstanceCanvas,
    segments: &mut BTreeMap<u32, SegmentInfo>,
    valid: &mut Vec<usize>,
    detection: &Detection,
    index: usize,
    new_id: u32,
) {
    segments.insert(
        new_id,
        SegmentInfo::from_bbox(new_id, detection.category_id, detection.bbox),
    );
    canvas.paint(new_id, &detection.mask);
    valid.push(index);
}
