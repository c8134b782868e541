//! Persistence of panoptic annotation records.
//!
//! One intermediate JSON record per image, written immediately after
//! composition, plus the combined dataset file assembled at the end of a
//! run. A crash loses at most the in-flight image; `combine_all` can be
//! re-run on whatever intermediates exist.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::{ImageBuffer, Luma};
use tracing::{debug, info};

use crate::config::{self, RunPaths};
use crate::models::ImageAnnotation;

/// Writes per-image label maps and annotation records for one run.
pub struct AnnotationStore {
    panoptic_dir: PathBuf,
    intermediate_dir: PathBuf,
    combined_file: PathBuf,
}

impl AnnotationStore {
    /// Create the annotation directories; fails when either already exists.
    pub fn create(paths: &RunPaths) -> anyhow::Result<Self> {
        config::create_fresh(&paths.panoptic_dir())?;
        config::create_fresh(&paths.intermediate_dir())?;
        Ok(Self::at(paths))
    }

    /// Attach to an existing run directory, for re-running `combine`.
    pub fn open_existing(paths: &RunPaths) -> anyhow::Result<Self> {
        anyhow::ensure!(
            paths.intermediate_dir().is_dir(),
            "{} is not a run directory (no annotation_json)",
            paths.root().display()
        );
        Ok(Self::at(paths))
    }

    fn at(paths: &RunPaths) -> Self {
        Self {
            panoptic_dir: paths.panoptic_dir(),
            intermediate_dir: paths.intermediate_dir(),
            combined_file: paths.combined_file(),
        }
    }

    /// Persist the instance id map for one image as a lossless PNG.
    pub fn write_canvas(
        &self,
        file_name: &str,
        label_image: &ImageBuffer<Luma<u16>, Vec<u16>>,
    ) -> anyhow::Result<()> {
        let path = self
            .panoptic_dir
            .join(Path::new(file_name).with_extension("png"));
        label_image
            .save(&path)
            .with_context(|| format!("cannot save label image {}", path.display()))?;
        Ok(())
    }

    /// Persist one image's record, named after the image stem.
    pub fn write_intermediate(&self, annotation: &ImageAnnotation) -> anyhow::Result<()> {
        let stem = Path::new(&annotation.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| annotation.image_id.to_string());
        let path = self.intermediate_dir.join(format!("{stem}.json"));
        let file = fs::File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer(file, annotation)
            .with_context(|| format!("cannot write {}", path.display()))?;
        debug!("wrote intermediate annotation {}", path.display());
        Ok(())
    }

    /// Combine every intermediate record into the dataset file.
    ///
    /// Always rewrites the combined file from the intermediates currently
    /// on disk. Returns the number of records combined.
    pub fn combine_all(&self) -> anyhow::Result<usize> {
        let mut annotations: Vec<ImageAnnotation> = Vec::new();
        let entries = fs::read_dir(&self.intermediate_dir)
            .with_context(|| format!("cannot read {}", self.intermediate_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            let annotation: ImageAnnotation = serde_json::from_str(&raw)
                .with_context(|| format!("malformed intermediate record {}", path.display()))?;
            annotations.push(annotation);
        }
        annotations.sort_by_key(|annotation| annotation.image_id);

        let file = fs::File::create(&self.combined_file)
            .with_context(|| format!("cannot create {}", self.combined_file.display()))?;
        serde_json::to_writer(file, &annotations)?;
        info!(
            "combined {} annotations into {}",
            annotations.len(),
            self.combined_file.display()
        );
        Ok(annotations.len())
    }

    pub fn combined_file(&self) -> &Path {
        &self.combined_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentInfo;

    fn sample(image_id: u32, file_name: &str) -> ImageAnnotation {
        ImageAnnotation {
            image_id,
            file_name: file_name.to_string(),
            segments_info: vec![SegmentInfo::from_bbox(1, 0, [0, 0, 4, 4])],
        }
    }

    fn fresh_store(root: &Path) -> AnnotationStore {
        AnnotationStore::create(&RunPaths::from_root(root.to_path_buf())).unwrap()
    }

    #[test]
    fn test_create_rejects_existing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::from_root(dir.path().to_path_buf());
        AnnotationStore::create(&paths).unwrap();
        assert!(AnnotationStore::create(&paths).is_err());
    }

    #[test]
    fn test_combine_counts_match_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let store = fresh_store(dir.path());
        store.write_intermediate(&sample(1, "a.jpg")).unwrap();
        store.write_intermediate(&sample(2, "b.png")).unwrap();
        assert_eq!(store.combine_all().unwrap(), 2);

        let combined: Vec<ImageAnnotation> =
            serde_json::from_str(&fs::read_to_string(store.combined_file()).unwrap()).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].image_id, 1);
        assert_eq!(combined[1].file_name, "b.png");
    }

    #[test]
    fn test_combine_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = fresh_store(dir.path());
        store.write_intermediate(&sample(1, "a.jpg")).unwrap();
        store.combine_all().unwrap();
        let first = fs::read_to_string(store.combined_file()).unwrap();
        store.combine_all().unwrap();
        let second = fs::read_to_string(store.combined_file()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_combine_tolerates_zero_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let store = fresh_store(dir.path());
        assert_eq!(store.combine_all().unwrap(), 0);
        assert_eq!(
            fs::read_to_string(store.combined_file()).unwrap(),
            "[]"
        );
    }

    #[test]
    fn test_open_existing_requires_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::from_root(dir.path().join("nope"));
        assert!(AnnotationStore::open_existing(&paths).is_err());
    }

    #[test]
    fn test_canvas_name_swaps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = fresh_store(dir.path());
        let label = ImageBuffer::from_pixel(4, 4, Luma([2u16]));
        store.write_canvas("photo.jpg", &label).unwrap();
        assert!(dir
            .path()
            .join("panoptic_annotation")
            .join("photo.png")
            .is_file());
    }
}
