//! End-to-end test of composition and persistence with a scripted oracle.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, RgbImage};

use panharvest::compose::PanopticComposer;
use panharvest::config::RunPaths;
use panharvest::models::{BitMask, CategoryLabel, ImageAnnotation, ImageCandidate};
use panharvest::oracle::{OracleError, OracleKind, Prediction, SegmentationOracle};
use panharvest::pipeline::ImageIdCounter;
use panharvest::store::AnnotationStore;

/// Oracle returning canned predictions per label name.
struct ScriptedOracle {
    responses: HashMap<String, Vec<Prediction>>,
}

#[async_trait]
impl SegmentationOracle for ScriptedOracle {
    fn kind(&self) -> OracleKind {
        OracleKind::VitL
    }

    async fn predict(
        &self,
        _image: &DynamicImage,
        label: &str,
        _box_threshold: f32,
        _text_threshold: f32,
    ) -> Result<Vec<Prediction>, OracleError> {
        Ok(self.responses.get(label).cloned().unwrap_or_default())
    }
}

fn rect_prediction(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Prediction {
    let mut mask = BitMask::new(width, height);
    mask.fill_rect(x0, y0, x1, y1);
    Prediction {
        mask,
        bbox: [x0 as f32, y0 as f32, x1 as f32, y1 as f32],
        phrase: "scripted".to_string(),
        score: 0.8,
    }
}

fn write_candidate(dir: &Path, name: &str, width: u32, height: u32) -> ImageCandidate {
    let path = dir.join(name);
    RgbImage::new(width, height).save(&path).unwrap();
    ImageCandidate {
        path,
        width,
        height,
    }
}

fn labels() -> Vec<CategoryLabel> {
    vec![
        CategoryLabel {
            id: 0,
            name: "cat".to_string(),
        },
        CategoryLabel {
            id: 1,
            name: "dog".to_string(),
        },
    ]
}

#[tokio::test]
async fn annotates_images_and_combines_records() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::from_root(dir.path().to_path_buf());
    let images_dir = paths.images_dir();
    fs::create_dir_all(&images_dir).unwrap();
    let store = AnnotationStore::create(&paths).unwrap();

    let mut responses = HashMap::new();
    responses.insert(
        "cat".to_string(),
        vec![rect_prediction(32, 24, 2, 2, 12, 12)],
    );
    responses.insert(
        "dog".to_string(),
        vec![rect_prediction(32, 24, 16, 4, 28, 20)],
    );
    let composer =
        PanopticComposer::new(Box::new(ScriptedOracle { responses }), labels()).unwrap();

    let mut counter = ImageIdCounter::new();
    let first = write_candidate(&images_dir, "one.png", 32, 24);
    let second = write_candidate(&images_dir, "two.png", 32, 24);

    let outcome = composer
        .generate_annotation(&first, &store, &mut counter, 0.3, 0.25)
        .await
        .unwrap()
        .expect("first image should be annotated");
    assert_eq!(outcome.annotation.image_id, 1);
    assert_eq!(outcome.annotation.file_name, "one.png");
    assert_eq!(outcome.annotation.segments_info.len(), 2);
    assert_eq!(outcome.preview.dimensions(), (32, 24));
    // Segments arrive in increasing id order with label-derived categories.
    assert_eq!(outcome.annotation.segments_info[0].id, 1);
    assert_eq!(outcome.annotation.segments_info[0].category_id, 0);
    assert_eq!(outcome.annotation.segments_info[1].id, 2);
    assert_eq!(outcome.annotation.segments_info[1].category_id, 1);

    let outcome = composer
        .generate_annotation(&second, &store, &mut counter, 0.3, 0.25)
        .await
        .unwrap()
        .expect("second image should be annotated");
    assert_eq!(outcome.annotation.image_id, 2);

    // One intermediate record and one label map per image.
    assert!(paths.intermediate_dir().join("one.json").is_file());
    assert!(paths.intermediate_dir().join("two.json").is_file());
    let label_map = image::open(paths.panoptic_dir().join("one.png")).unwrap();
    assert_eq!(label_map.dimensions(), (32, 24));

    assert_eq!(store.combine_all().unwrap(), 2);
    let combined: Vec<ImageAnnotation> =
        serde_json::from_str(&fs::read_to_string(paths.combined_file()).unwrap()).unwrap();
    assert_eq!(combined.len(), 2);
    assert!(combined[0].image_id < combined[1].image_id);

    // Re-running combine without new intermediates changes nothing.
    let before = fs::read_to_string(paths.combined_file()).unwrap();
    store.combine_all().unwrap();
    assert_eq!(fs::read_to_string(paths.combined_file()).unwrap(), before);
}

#[tokio::test]
async fn unmatched_image_is_deleted_without_a_record() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::from_root(dir.path().to_path_buf());
    let images_dir = paths.images_dir();
    fs::create_dir_all(&images_dir).unwrap();
    let store = AnnotationStore::create(&paths).unwrap();

    let composer = PanopticComposer::new(
        Box::new(ScriptedOracle {
            responses: HashMap::new(),
        }),
        labels(),
    )
    .unwrap();

    let mut counter = ImageIdCounter::new();
    let candidate = write_candidate(&images_dir, "empty.png", 32, 24);
    let outcome = composer
        .generate_annotation(&candidate, &store, &mut counter, 0.3, 0.25)
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(!candidate.path.exists());
    assert_eq!(counter.last(), 0);
    assert_eq!(store.combine_all().unwrap(), 0);
}

#[tokio::test]
async fn duplicate_detections_across_labels_are_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let paths = RunPaths::from_root(dir.path().to_path_buf());
    let images_dir = paths.images_dir();
    fs::create_dir_all(&images_dir).unwrap();
    let store = AnnotationStore::create(&paths).unwrap();

    // Both labels report the same region: the later label's detection
    // evicts the earlier one.
    let mut responses = HashMap::new();
    responses.insert(
        "cat".to_string(),
        vec![rect_prediction(32, 24, 4, 4, 20, 20)],
    );
    responses.insert(
        "dog".to_string(),
        vec![rect_prediction(32, 24, 4, 4, 20, 20)],
    );
    let composer =
        PanopticComposer::new(Box::new(ScriptedOracle { responses }), labels()).unwrap();

    let mut counter = ImageIdCounter::new();
    let candidate = write_candidate(&images_dir, "dup.png", 32, 24);
    let outcome = composer
        .generate_annotation(&candidate, &store, &mut counter, 0.3, 0.25)
        .await
        .unwrap()
        .expect("duplicate detections still annotate the image");

    assert_eq!(outcome.annotation.segments_info.len(), 1);
    let survivor = &outcome.annotation.segments_info[0];
    assert_eq!(survivor.id, 2);
    assert_eq!(survivor.category_id, 1);
    assert_eq!(survivor.area, 256);
}
